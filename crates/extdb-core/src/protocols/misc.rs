//! Utility protocol: time queries and echo.

use chrono::{Duration, Timelike, Utc};

use crate::error::Result;

use super::{Context, Protocol};

/// `TIME` answers the current UTC clock as `[hour,minute,second]`,
/// `TIME:<offset_hours>` the same shifted; anything else echoes back
/// verbatim.
#[derive(Debug, Default)]
pub struct Misc;

impl Misc {
    pub fn new() -> Self {
        Self
    }
}

fn clock(offset_hours: i64) -> String {
    let t = Utc::now() + Duration::hours(offset_hours);
    format!("[{},{},{}]", t.hour(), t.minute(), t.second())
}

impl Protocol for Misc {
    fn init(&mut self, _ctx: &Context, _init_data: &str) -> Result<()> {
        Ok(())
    }

    fn call(&self, _ctx: &Context, data: &str) -> Result<String> {
        if data == "TIME" {
            return Ok(clock(0));
        }
        if let Some(rest) = data.strip_prefix("TIME:") {
            if let Ok(offset) = rest.trim().parse::<i64>() {
                return Ok(clock(offset));
            }
        }
        Ok(data.to_string())
    }
}
