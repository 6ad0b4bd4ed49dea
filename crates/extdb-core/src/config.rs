//! INI configuration loading and discovery.
//!
//! The extension reads a single `extdb-conf.ini` from the host working
//! directory. Operators may have the file renamed to a randomized
//! `extdb-conf-XXXXXXXX.ini` (legacy obfuscation support); discovery then
//! falls back to the first regular file matching `extdb-conf.*ini`.
//!
//! `[Main]` keys: `Threads`, `Steam_WEB_API_KEY`, `Randomize Config File`.
//! `[Logging]` keys: `Level`. Database sections keep their raw key/value
//! form inside [`Settings`] so `9:DATABASE:<section>` can resolve them by
//! name at runtime.

use std::path::{Path, PathBuf};

use ini::Ini;
use rand::Rng;
use regex::Regex;

use crate::error::{ExtError, Result};

/// The canonical configuration file name.
pub const CONFIG_FILE: &str = "extdb-conf.ini";

/// Parsed configuration plus the retained INI tree for section lookups.
#[derive(Clone)]
pub struct Settings {
    /// Worker thread count; 0 means use the machine's parallelism
    pub threads: usize,
    /// API key handed to protocol handlers through their context
    pub api_key: String,
    /// Whether to rename the config file to a randomized name on startup
    pub randomize_config: bool,
    /// Raw `Logging.Level` value; empty when unset
    pub log_level: String,
    /// Directory the `extDB/` tree (logs, sqlite files) lives under
    pub base_dir: PathBuf,
    ini: Ini,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("threads", &self.threads)
            .field("randomize_config", &self.randomize_config)
            .field("log_level", &self.log_level)
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}

/// Result of configuration discovery.
#[derive(Debug)]
pub struct Discovered {
    pub settings: Settings,
    /// The file the configuration was loaded from
    pub path: PathBuf,
    /// True when a randomized `extdb-conf-*.ini` was loaded
    pub randomized: bool,
}

impl Settings {
    /// Load settings from an INI file on disk.
    pub fn load(path: &Path) -> Result<Self> {
        let ini = Ini::load_from_file(path)
            .map_err(|e| ExtError::Config(format!("{}: {}", path.display(), e)))?;
        let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        Ok(Self::from_ini(ini, base_dir))
    }

    /// Parse settings from INI text. Used by tests and embedders.
    pub fn parse_str(text: &str, base_dir: &Path) -> Result<Self> {
        let ini =
            Ini::load_from_str(text).map_err(|e| ExtError::Config(e.to_string()))?;
        Ok(Self::from_ini(ini, base_dir.to_path_buf()))
    }

    fn from_ini(ini: Ini, base_dir: PathBuf) -> Self {
        let threads = get_int(&ini, "Main", "Threads").unwrap_or(0).max(0) as usize;
        let api_key = get_str(&ini, "Main", "Steam_WEB_API_KEY")
            .unwrap_or_default()
            .to_string();
        let randomize_config =
            get_str(&ini, "Main", "Randomize Config File").map_or(false, parse_bool);
        let log_level = get_str(&ini, "Logging", "Level").unwrap_or_default().to_string();
        Self {
            threads,
            api_key,
            randomize_config,
            log_level,
            base_dir,
            ini,
        }
    }

    /// Locate and load the configuration in `dir`.
    ///
    /// The literal `extdb-conf.ini` wins; otherwise the first regular file
    /// (in name order) matching `extdb-conf.*ini` is taken as a previously
    /// randomized config. No match is a fatal condition for the embedder.
    pub fn discover(dir: &Path) -> Result<Discovered> {
        let literal = dir.join(CONFIG_FILE);
        if literal.is_file() {
            return Ok(Discovered {
                settings: Settings::load(&literal)?,
                path: literal,
                randomized: false,
            });
        }

        let pattern = Regex::new(r"extdb-conf.*ini").expect("static regex");
        let mut names: Vec<String> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| pattern.is_match(name))
            .collect();
        names.sort();

        match names.first() {
            Some(name) => {
                let path = dir.join(name);
                Ok(Discovered {
                    settings: Settings::load(&path)?,
                    path,
                    randomized: true,
                })
            }
            None => Err(ExtError::Config(format!(
                "unable to find {} in {}",
                CONFIG_FILE,
                dir.display()
            ))),
        }
    }

    /// Effective worker-pool size: `Main.Threads`, else machine parallelism.
    pub fn worker_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Raw string value from an arbitrary section.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        get_str(&self.ini, section, key)
    }

    /// Whether `section` has a `key` at all.
    pub fn has(&self, section: &str, key: &str) -> bool {
        self.get(section, key).is_some()
    }

    /// All key/value pairs of a section, in file order.
    pub fn section_entries(&self, section: &str) -> Option<Vec<(String, String)>> {
        self.ini.section(Some(section)).map(|props| {
            props
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
    }
}

fn get_str<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section)).and_then(|props| props.get(key))
}

fn get_int(ini: &Ini, section: &str, key: &str) -> Option<i64> {
    get_str(ini, section, key).and_then(|v| v.trim().parse().ok())
}

/// INI booleans: true/yes/on/1, everything else false.
fn parse_bool(value: &str) -> bool {
    let v = value.trim();
    v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
        || v == "1"
}

/// Build a randomized replacement file name: `extdb-conf-XXXXXXXX.ini`,
/// X drawn from `[A-Z0-9]`. Lowercase is skipped deliberately, the legacy
/// hosts this exists for are case-insensitive about it anyway.
pub fn randomized_config_name<R: Rng>(rng: &mut R) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890";
    let suffix: String = (0..8)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect();
    format!("extdb-conf-{}.ini", suffix)
}

/// Rename the loaded config to a randomized name, once.
pub fn randomize_config_file(path: &Path) -> Result<PathBuf> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let target = dir.join(randomized_config_name(&mut rand::thread_rng()));
    std::fs::rename(path, &target)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SAMPLE: &str = "\
[Main]
Threads = 3
Steam_WEB_API_KEY = abc123
Randomize Config File = false

[Logging]
Level = debug

[Database]
Type = SQLite
Name = test.db
";

    #[test]
    fn test_parse_main_section() {
        let s = Settings::parse_str(SAMPLE, Path::new(".")).unwrap();
        assert_eq!(s.threads, 3);
        assert_eq!(s.api_key, "abc123");
        assert!(!s.randomize_config);
        assert_eq!(s.log_level, "debug");
        assert_eq!(s.get("Database", "Type"), Some("SQLite"));
        assert!(s.has("Database", "Name"));
        assert!(!s.has("Database", "Username"));
    }

    #[test]
    fn test_parse_bool_forms() {
        assert!(parse_bool("true"));
        assert!(parse_bool("Yes"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("nope"));
    }

    #[test]
    fn test_worker_threads_fallback() {
        let s = Settings::parse_str("[Main]\nThreads = 0\n", Path::new(".")).unwrap();
        assert!(s.worker_threads() >= 1);
        let s = Settings::parse_str("[Main]\nThreads = 4\n", Path::new(".")).unwrap();
        assert_eq!(s.worker_threads(), 4);
    }

    #[test]
    fn test_discover_literal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), SAMPLE).unwrap();
        let found = Settings::discover(dir.path()).unwrap();
        assert!(!found.randomized);
        assert_eq!(found.settings.threads, 3);
    }

    #[test]
    fn test_discover_randomized() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("extdb-conf-A1B2C3D4.ini"), SAMPLE).unwrap();
        let found = Settings::discover(dir.path()).unwrap();
        assert!(found.randomized);
        assert!(found
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("extdb-conf-"));
    }

    #[test]
    fn test_discover_missing_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::discover(dir.path()).is_err());
    }

    #[test]
    fn test_randomized_name_shape() {
        let name = randomized_config_name(&mut rand::thread_rng());
        assert_eq!(name.len(), "extdb-conf-XXXXXXXX.ini".len());
        assert!(name.starts_with("extdb-conf-"));
        assert!(name.ends_with(".ini"));
        let suffix = &name["extdb-conf-".len()..name.len() - 4];
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_randomize_renames_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, SAMPLE).unwrap();
        let renamed = randomize_config_file(&path).unwrap();
        assert!(!path.exists());
        assert!(renamed.exists());
        // and discovery still finds it
        let found = Settings::discover(dir.path()).unwrap();
        assert!(found.randomized);
    }
}
