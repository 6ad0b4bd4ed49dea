//! Mission log protocol.
//!
//! `init_data` names a log target; every call appends one timestamped line
//! to `extDB/logs/<target>.log`. Returns no payload, which makes it a
//! natural fit for fire-and-forget calls.

use std::fs::{File, OpenOptions};
use std::io::Write;

use chrono::Local;
use parking_lot::Mutex;

use crate::error::{ExtError, Result};

use super::{Context, Protocol};

#[derive(Default)]
pub struct LogFile {
    file: Option<Mutex<File>>,
}

impl LogFile {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Target names stay inside the logs directory: plain file-name characters
/// only.
fn valid_target(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !name.contains("..")
}

impl Protocol for LogFile {
    fn init(&mut self, ctx: &Context, init_data: &str) -> Result<()> {
        let target = init_data.trim();
        if !valid_target(target) {
            return Err(ExtError::Config(format!(
                "invalid log target: {:?}",
                init_data
            )));
        }
        let dir = ctx.settings().base_dir.join("extDB").join("logs");
        std::fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("{}.log", target)))?;
        self.file = Some(Mutex::new(file));
        Ok(())
    }

    fn call(&self, _ctx: &Context, data: &str) -> Result<String> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| ExtError::Config("log protocol not initialized".to_string()))?;
        let mut file = file.lock();
        writeln!(file, "{} {}", Local::now().format("%Y-%m-%d %H:%M:%S"), data)?;
        Ok(String::new())
    }
}
