//! Problem and trajectory ingest.
//!
//! A problem file is JSON holding the evaluation configuration and the
//! sequence under evaluation. The trajectory can also come from a CSV with a
//! `rep,ky,kz` header, which replaces the JSON trajectory.
//!
//! Design goals:
//! - **Strict schema**: unknown JSON fields and missing CSV columns fail with
//!   exit code 2
//! - **Line-accurate errors** for CSV rows
//! - no evaluation logic here

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::domain::{KPoint, NoiseConfig, SequenceInput, Trajectory};
use crate::error::AppError;

/// Contents of a problem JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProblemFile {
    pub config: NoiseConfig,
    pub sequence: SequenceInput,
}

impl ProblemFile {
    /// Parse and validate a problem from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, AppError> {
        let problem: ProblemFile =
            serde_json::from_str(text).map_err(|e| AppError::new(2, format!("Invalid problem file: {e}")))?;
        problem.config.validate()?;
        Ok(problem)
    }
}

/// Load a problem file, optionally replacing its trajectory with a CSV one.
pub fn load_problem(path: &Path, trajectory_csv: Option<&Path>) -> Result<ProblemFile, AppError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::new(2, format!("Failed to read problem file '{}': {e}", path.display())))?;
    let mut problem = ProblemFile::from_json_str(&text)
        .map_err(|e| AppError::new(e.exit_code(), format!("{}: {e}", path.display())))?;

    if let Some(csv_path) = trajectory_csv {
        problem.sequence.trajectory = read_trajectory_csv(csv_path)?;
    }
    Ok(problem)
}

/// Read a trajectory CSV file.
pub fn read_trajectory_csv(path: &Path) -> Result<Trajectory, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open trajectory CSV '{}': {e}", path.display())))?;
    parse_trajectory_csv(file)
}

/// Parse `rep,ky[,kz]` rows into a trajectory.
///
/// Rows sharing a `rep` form one repetition, in file order. Repetitions are
/// 0-based and must be contiguous. A missing `kz` column means `kz = 0`.
pub fn parse_trajectory_csv(input: impl Read) -> Result<Trajectory, AppError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read trajectory CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    for required in ["rep", "ky"] {
        if !header_map.contains_key(required) {
            return Err(AppError::new(
                2,
                format!("Missing required trajectory column: `{required}`"),
            ));
        }
    }

    let mut reps: BTreeMap<usize, Vec<KPoint>> = BTreeMap::new();
    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let record = result.map_err(|e| AppError::new(2, format!("Trajectory CSV line {line}: {e}")))?;
        let (rep, point) =
            parse_row(&record, &header_map).map_err(|e| AppError::new(2, format!("Trajectory CSV line {line}: {e}")))?;
        reps.entry(rep).or_default().push(point);
    }

    if reps.is_empty() {
        return Err(AppError::new(3, "Trajectory CSV has no samples."));
    }
    if let Some((expected, found)) = reps.keys().enumerate().find(|(i, rep)| *i != **rep) {
        return Err(AppError::new(
            2,
            format!("Trajectory CSV repetitions must be contiguous from 0: expected {expected}, found {found}."),
        ));
    }

    Ok(Trajectory(reps.into_values().collect()))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports may prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<(usize, KPoint), String> {
    let rep_raw = get_required(record, header_map, "rep")?;
    let rep = rep_raw
        .parse::<usize>()
        .map_err(|_| format!("invalid `rep` value '{rep_raw}'"))?;

    let ky = parse_coord(get_required(record, header_map, "ky")?, "ky")?;
    let kz = match get_optional(record, header_map, "kz") {
        Some(raw) => parse_coord(raw, "kz")?,
        None => 0.0,
    };
    Ok((rep, KPoint::new(ky, kz)))
}

fn parse_coord(raw: &str, name: &str) -> Result<f64, String> {
    let v = raw.parse::<f64>().map_err(|_| format!("invalid `{name}` value '{raw}'"))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("non-finite `{name}` value '{raw}'"))
    }
}

fn get_required<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Result<&'a str, String> {
    get_optional(record, header_map, name).ok_or_else(|| format!("missing `{name}` value"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = *header_map.get(name)?;
    record.get(idx).filter(|s| !s.is_empty())
}
