use std::path::{Path, PathBuf};
use std::str::FromStr;

use target_core::error::ConfigError;
use target_core::AlignConfig;
use thiserror::Error;

pub const USAGE: &str = "\
Usage: target-align <scene> <reference> [options]

Arguments:
  <scene>            Photo containing the printed target
  <reference>        Reference image of the target

Options:
  --config FILE      Load configuration from a .toml or .json file
  --preset NAME      sift (default), orb or orb-lsh; ignored with --config
  --aligned FILE     Where to write the aligned image [default: aligned.png]
  --matches FILE     Write a side-by-side visualization of filtered matches
  --overlay FILE     Write the reference blended with the aligned image
  --log LEVEL        Log specification for flexi_logger [default: info]
  -h, --help         Print this help";

#[derive(Debug, Error, PartialEq)]
pub enum CliError {
    #[error("help requested")]
    HelpRequested,
    #[error("option {0} needs a value")]
    MissingValue(String),
    #[error("unknown option {0}")]
    UnknownOption(String),
    #[error("unknown preset '{0}', expected sift, orb or orb-lsh")]
    UnknownPreset(String),
    #[error("missing <{0}> argument")]
    MissingPositional(&'static str),
    #[error("unexpected argument {0}")]
    UnexpectedArgument(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Preset {
    #[default]
    SiftFlann,
    OrbHamming,
    OrbLsh,
}

impl Preset {
    pub fn config(self) -> AlignConfig {
        match self {
            Preset::SiftFlann => AlignConfig::sift_flann_preset(),
            Preset::OrbHamming => AlignConfig::orb_hamming_preset(),
            Preset::OrbLsh => AlignConfig::orb_lsh_preset(),
        }
    }
}

impl FromStr for Preset {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sift" => Ok(Preset::SiftFlann),
            "orb" => Ok(Preset::OrbHamming),
            "orb-lsh" => Ok(Preset::OrbLsh),
            _ => Err(CliError::UnknownPreset(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub scene: PathBuf,
    pub reference: PathBuf,
    pub config: Option<PathBuf>,
    pub preset: Preset,
    pub aligned: PathBuf,
    pub matches: Option<PathBuf>,
    pub overlay: Option<PathBuf>,
    pub log_level: String,
}

impl CliArgs {
    /// Parse arguments, excluding the program name
    pub fn parse<I, S>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut positional = Vec::new();
        let mut config = None;
        let mut preset = Preset::default();
        let mut aligned = PathBuf::from("aligned.png");
        let mut matches = None;
        let mut overlay = None;
        let mut log_level = String::from("info");

        let mut iter = args.into_iter().map(Into::into);
        while let Some(arg) = iter.next() {
            let mut value = |name: &str| iter.next().ok_or_else(|| CliError::MissingValue(name.to_string()));
            match arg.as_str() {
                "-h" | "--help" => return Err(CliError::HelpRequested),
                "--config" => config = Some(PathBuf::from(value("--config")?)),
                "--preset" => preset = value("--preset")?.parse()?,
                "--aligned" => aligned = PathBuf::from(value("--aligned")?),
                "--matches" => matches = Some(PathBuf::from(value("--matches")?)),
                "--overlay" => overlay = Some(PathBuf::from(value("--overlay")?)),
                "--log" => log_level = value("--log")?,
                s if s.starts_with("--") => return Err(CliError::UnknownOption(s.to_string())),
                s => positional.push(PathBuf::from(s)),
            }
        }

        let mut positional = positional.into_iter();
        let scene = positional.next().ok_or(CliError::MissingPositional("scene"))?;
        let reference = positional.next().ok_or(CliError::MissingPositional("reference"))?;
        if let Some(extra) = positional.next() {
            return Err(CliError::UnexpectedArgument(extra.display().to_string()));
        }

        Ok(Self {
            scene,
            reference,
            config,
            preset,
            aligned,
            matches,
            overlay,
            log_level,
        })
    }

    /// The configuration file when given, the preset otherwise
    pub fn load_config(&self) -> Result<AlignConfig, ConfigError> {
        match &self.config {
            Some(path) => load_config_file(path),
            None => Ok(self.preset.config()),
        }
    }
}

fn load_config_file(path: &Path) -> Result<AlignConfig, ConfigError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        AlignConfig::load_json(path)
    } else {
        AlignConfig::load_toml(path)
    }
}
