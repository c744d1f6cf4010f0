//! JSON line-delimited run logs under `logs/`.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

fn log_dir() -> io::Result<()> {
    fs::create_dir_all("logs")
}

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

fn append_json_line<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    serde_json::to_writer(&mut file, value)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    file.write_all(b"\n")
}

#[derive(Debug, Serialize)]
pub struct TrainingLogEntry {
    pub iteration: usize,
    pub loss: f64,
    pub learning_rate: f64,
    pub timestamp_ms: u128,
}

pub fn log_training_iteration(
    iteration: usize,
    loss: f64,
    learning_rate: f64,
) -> io::Result<()> {
    log_dir()?;
    let entry = TrainingLogEntry {
        iteration,
        loss,
        learning_rate,
        timestamp_ms: timestamp_ms(),
    };
    append_json_line("logs/train.jsonl", &entry)
}

#[derive(Debug, Serialize)]
pub struct GradientCheckLogEntry {
    pub param: String,
    pub relative_error: f64,
    pub timestamp_ms: u128,
}

pub fn log_gradient_check(param: &str, relative_error: f64) -> io::Result<()> {
    log_dir()?;
    let entry = GradientCheckLogEntry {
        param: param.to_string(),
        relative_error,
        timestamp_ms: timestamp_ms(),
    };
    append_json_line("logs/gradient_check.jsonl", &entry)
}
