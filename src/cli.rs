use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use blowfish_service::config::{read_config, HashingConfig};
use blowfish_service::crypto::entropy::TieredEntropy;
use blowfish_service::crypto::primitive;

#[derive(Debug, Parser)]
#[command(name = "blowfish-service")]
#[command(about = "Salted bcrypt hashing and verification")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// JSON config file
    #[arg(long, global = true, env = "BLOWFISH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cost override (4 to 31)
    #[arg(long, global = true)]
    pub cost: Option<u32>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Hash a plaintext value
    Hash {
        value: String,
    },

    /// Check a plaintext value against an encoded hash
    Check {
        value: String,
        hash: String,
    },

    /// Print entropy bytes as hex
    Entropy {
        #[arg(default_value_t = 16)]
        length: usize,
    },

    /// Run the bcrypt known-answer probe
    Probe,
}

/// How a successful command run should exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    NoMatch,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::NoMatch => ExitCode::FAILURE,
        }
    }
}

impl Cli {
    /// Config file contents (or defaults) with `--cost` applied. Cost is
    /// validated later, when the service is built.
    pub fn resolve_config(&self) -> Result<HashingConfig> {
        let mut config = match &self.config {
            Some(path) => read_config(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => HashingConfig::default(),
        };
        if let Some(cost) = self.cost {
            config.cost = cost;
        }
        Ok(config)
    }
}

pub fn run(command: Command, config: &HashingConfig, out: &mut impl Write) -> Result<Outcome> {
    primitive::init().context("bcrypt capability check failed")?;

    match command {
        Command::Hash { value } => {
            let service = config.build_service()?;
            writeln!(out, "{}", service.hash(&value)?)?;
            Ok(Outcome::Success)
        }
        Command::Check { value, hash } => {
            let service = config.build_service()?;
            if service.check(&value, &hash) {
                writeln!(out, "match")?;
                Ok(Outcome::Success)
            } else {
                writeln!(out, "no-match")?;
                Ok(Outcome::NoMatch)
            }
        }
        Command::Entropy { length } => {
            let bytes = TieredEntropy::with_device(&config.entropy_device).acquire(length)?;
            writeln!(out, "{}", hex::encode(bytes))?;
            Ok(Outcome::Success)
        }
        Command::Probe => {
            writeln!(out, "bcrypt primitive ok")?;
            Ok(Outcome::Success)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::{Mutex, MutexGuard};
    use tempfile::NamedTempFile;

    // Parsing reads BLOWFISH_CONFIG, which one test sets.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn parse(args: &[&str]) -> Cli {
        let _guard = env_lock();
        let argv = std::iter::once("blowfish-service").chain(args.iter().copied());
        Cli::try_parse_from(argv).expect("arguments should parse")
    }

    fn execute(cli: Cli) -> (Result<Outcome>, String) {
        let mut out = Vec::new();
        let result = cli
            .resolve_config()
            .and_then(|config| run(cli.command, &config, &mut out));
        (result, String::from_utf8(out).expect("utf-8 output"))
    }

    fn config_file(json: &str) -> NamedTempFile {
        let file = NamedTempFile::new().expect("temp file");
        fs::write(file.path(), json).unwrap();
        file
    }

    #[test]
    fn cost_flag_overrides_an_invalid_config_cost() {
        let file = config_file(r#"{"cost":40}"#);
        let path = file.path().to_str().unwrap();

        let (result, stdout) = execute(parse(&["--config", path, "--cost", "5", "hash", "x"]));
        assert_eq!(result.expect("hash should succeed"), Outcome::Success);
        assert!(stdout.trim_end().starts_with("$2y$05$"), "unexpected output: {stdout}");
    }

    #[test]
    fn invalid_config_cost_without_override_fails() {
        let file = config_file(r#"{"cost":40}"#);
        let path = file.path().to_str().unwrap();

        let (result, _) = execute(parse(&["--config", path, "hash", "x"]));
        assert!(format!("{:#}", result.unwrap_err()).contains("between 4 and 31"));
    }

    #[test]
    fn check_reports_match_and_no_match() {
        let hash = {
            let (result, stdout) = execute(parse(&["--cost", "4", "hash", "p@s$w0Rd"]));
            assert_eq!(result.unwrap(), Outcome::Success);
            stdout.trim_end().to_string()
        };

        let (result, stdout) = execute(parse(&["--cost", "4", "check", "p@s$w0Rd", &hash]));
        assert_eq!(result.unwrap(), Outcome::Success);
        assert_eq!(stdout, "match\n");

        let (result, stdout) = execute(parse(&["--cost", "4", "check", "wrong", &hash]));
        assert_eq!(result.unwrap(), Outcome::NoMatch);
        assert_eq!(stdout, "no-match\n");
    }

    #[test]
    fn entropy_prints_two_hex_chars_per_byte() {
        let (result, stdout) = execute(parse(&["entropy", "10"]));
        assert_eq!(result.unwrap(), Outcome::Success);
        let hex = stdout.trim_end();
        assert_eq!(hex.len(), 20);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn config_path_is_read_from_the_environment() {
        let file = config_file(r#"{"cost":6}"#);
        let cli = {
            let _guard = env_lock();
            std::env::set_var("BLOWFISH_CONFIG", file.path());
            let cli = Cli::try_parse_from(["blowfish-service", "probe"]);
            std::env::remove_var("BLOWFISH_CONFIG");
            cli
        };

        let cli = cli.expect("arguments should parse");
        assert_eq!(cli.config.as_deref(), Some(file.path()));
        assert_eq!(cli.resolve_config().unwrap().cost, 6);
    }

    #[test]
    fn capability_check_command_succeeds() {
        let (result, stdout) = execute(parse(&["probe"]));
        assert_eq!(result.unwrap(), Outcome::Success);
        assert_eq!(stdout, "bcrypt primitive ok\n");
    }
}
