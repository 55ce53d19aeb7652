//! Voxgate CLI binary

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use serde_json::{json, Value};
use std::fs;
use std::process::ExitCode;

use voxgate::{AppConfig, AppPaths, AudioSample, ErrorClass, ErrorReport, VoiceAuth, VoxgateError};

mod cli;
use cli::{AudioArgs, Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{:#}", e);
            let (class, report) = match e.downcast_ref::<VoxgateError>() {
                Some(err) => (err.class(), json!(ErrorReport::from(err))),
                None => (
                    ErrorClass::Internal,
                    json!({"class": ErrorClass::Internal, "code": "setup_failed", "message": format!("{:#}", e)}),
                ),
            };
            println!("{}", json!({ "error": report }));
            ExitCode::from(exit_code(class))
        }
    }
}

async fn run(cli: Cli) -> Result<Value> {
    let paths = match &cli.home {
        Some(root) => AppPaths::under(root),
        None => AppPaths::new()?,
    };
    paths.ensure_directories()?;

    let config = AppConfig::load_or_create(&paths.config_file())
        .context("Failed to load configuration")?;

    let auth = VoiceAuth::from_config(&paths, &config)?;

    let output = match cli.command {
        Commands::Enroll(args) => {
            let sample = read_sample(&args)?;
            json!(auth.enroll_async(args.uid, sample).await?)
        }
        Commands::Verify { audio, threshold } => {
            let sample = read_sample(&audio)?;
            json!(auth.verify_async(audio.uid, sample, threshold).await?)
        }
        Commands::Remove { uid } => json!(auth.remove_async(uid).await?),
        Commands::List => json!({ "identities": auth.list()? }),
        Commands::Health => json!(auth.health()),
    };

    Ok(output)
}

fn read_sample(args: &AudioArgs) -> Result<AudioSample> {
    let bytes = fs::read(&args.audio)
        .with_context(|| format!("Failed to read audio file: {}", args.audio.display()))?;

    let sample = AudioSample::new(bytes);
    Ok(match args.format_hint() {
        Some(hint) => sample.with_format_hint(hint),
        None => sample,
    })
}

/// 0 ok, 1 internal, 2 bad input, 3 not found
fn exit_code(class: ErrorClass) -> u8 {
    match class {
        ErrorClass::Internal => 1,
        ErrorClass::BadInput => 2,
        ErrorClass::NotFound => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(ErrorClass::Internal), 1);
        assert_eq!(exit_code(ErrorClass::BadInput), 2);
        assert_eq!(exit_code(ErrorClass::NotFound), 3);
    }

    #[tokio::test]
    async fn test_health_and_unknown_identity() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().to_str().unwrap();

        let health = run(Cli::parse_from(["voxgate", "--home", home, "health"]))
            .await
            .unwrap();
        assert_eq!(health, json!({"ok": true}));

        let audio = dir.path().join("sample.bin");
        fs::write(&audio, b"whatever").unwrap();
        let err = run(Cli::parse_from([
            "voxgate",
            "--home",
            home,
            "verify",
            "--uid",
            "ghost",
            "--audio",
            audio.to_str().unwrap(),
        ]))
        .await
        .unwrap_err();
        let err = err.downcast_ref::<VoxgateError>().unwrap();
        assert_eq!(err.class(), ErrorClass::NotFound);
    }
}
