// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap, loads example files, calls the
// general API and prints results as JSON (one line per example).
//
// The training backend is Autodiff<Wgpu> with the `wgpu` feature
// (the default) and Autodiff<NdArray> without it.

pub mod commands;

use anyhow::Result;
use clap::Parser;
use std::collections::BTreeMap;
use tokenizers::Tokenizer;

use commands::{Commands, FeaturizeArgs, FinetuneArgs, PredictArgs};

use crate::application::{config::BaseConfig, general_api::LanguageModelGeneralApi};
use crate::data::loader::JsonlLoader;
use crate::domain::inputs::InputSchema;
use crate::infra::tokenizer_store::{self, TokenizerStore};

#[cfg(feature = "wgpu")]
type CliBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

#[cfg(not(feature = "wgpu"))]
type CliBackend = burn::backend::Autodiff<burn::backend::NdArray>;

#[derive(Parser, Debug)]
#[command(
    name = "lm-finetune",
    version,
    about = "Fine-tune a transformer language model on multi-input text, then predict or featurise."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Finetune(args)     => run_finetune(&args),
            Commands::Predict(args)      => run_predict(&args),
            Commands::PredictProba(args) => run_predict_proba(&args),
            Commands::Featurize(args)    => run_featurize(&args),
        }
    }
}

fn run_finetune(args: &FinetuneArgs) -> Result<()> {
    let (inputs, labels) = JsonlLoader::new(&args.data).load_labelled()?;
    let schema = schema_for(&args.inputs, &inputs)?;

    let tokenizer = finetune_tokenizer(args, &inputs)?;

    let mut api = LanguageModelGeneralApi::<CliBackend>::new(args.into(), schema, tokenizer, Default::default())?;
    let summary = api.finetune(&inputs, labels, &args.into())?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// `--tokenizer` if given, else the one in the autosave dir, built from
/// the training text on the first run.
fn finetune_tokenizer(args: &FinetuneArgs, inputs: &[Vec<String>]) -> Result<Tokenizer> {
    match &args.tokenizer {
        Some(path) => tokenizer_store::load_file(path),
        None => TokenizerStore::new(&args.autosave_dir)
            .load_or_build(inputs.iter().flatten().map(String::as_str), args.vocab_size),
    }
}

fn run_predict(args: &PredictArgs) -> Result<()> {
    let api = load_api(args)?;
    let inputs = JsonlLoader::new(&args.data).load()?.inputs;
    for label in api.predict(&inputs, args.max_length)? {
        println!("{}", serde_json::to_string(&label)?);
    }
    Ok(())
}

fn run_predict_proba(args: &PredictArgs) -> Result<()> {
    let api = load_api(args)?;
    let inputs = JsonlLoader::new(&args.data).load()?.inputs;
    for probs in api.predict_proba(&inputs, args.max_length)? {
        // JSON object keys are strings.
        let row: BTreeMap<String, f32> = probs.into_iter().map(|(l, p)| (l.to_string(), p)).collect();
        println!("{}", serde_json::to_string(&row)?);
    }
    Ok(())
}

fn run_featurize(args: &FeaturizeArgs) -> Result<()> {
    let inputs = JsonlLoader::new(&args.data).load()?.inputs;

    let api = match (&args.model_dir, &args.tokenizer) {
        (Some(dir), _) => {
            let config = BaseConfig { predict_batch_size: args.batch_size, ..BaseConfig::default() };
            LanguageModelGeneralApi::<CliBackend>::load(dir, config, Default::default())?
        }
        (None, Some(path)) => {
            let schema = schema_for(&args.inputs, &inputs)?;
            let tokenizer = tokenizer_store::load_file(path)?;
            LanguageModelGeneralApi::<CliBackend>::new(args.into(), schema, tokenizer, Default::default())?
        }
        (None, None) => anyhow::bail!("featurize needs --model-dir or --tokenizer"),
    };

    let features = api.featurize(&inputs, args.max_length)?;
    tracing::info!("Featurised {} examples ({} dims)", features.n_examples(), features.width());
    for row in features.rows() {
        println!("{}", serde_json::to_string(row)?);
    }
    Ok(())
}

fn load_api(args: &PredictArgs) -> Result<LanguageModelGeneralApi<CliBackend>> {
    Ok(LanguageModelGeneralApi::load(&args.model_dir, args.into(), Default::default())?)
}

/// Named channels if given, else positional ones sized by the first example.
fn schema_for(names: &[String], inputs: &[Vec<String>]) -> Result<InputSchema> {
    let schema = if names.is_empty() {
        InputSchema::positional(inputs.first().map_or(1, Vec::len))?
    } else {
        InputSchema::new(names.to_vec())?
    };
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::TrainingOptions;
    use crate::data::splitter::ValSize;

    #[test]
    fn test_finetune_args() {
        let cli = Cli::try_parse_from([
            "lm-finetune", "finetune",
            "--data", "train.jsonl",
            "--inputs", "question,context",
            "--val-size", "20",
            "--epochs", "5",
            "--d-model", "64",
            "--quiet",
        ])
        .unwrap();

        let Commands::Finetune(args) = cli.command else { panic!("expected finetune") };
        assert_eq!(args.inputs, ["question", "context"]);

        let config = BaseConfig::from(&args);
        assert_eq!(config.n_epochs, 5);
        assert_eq!(config.d_model, 64);
        assert_eq!(config.max_length, 512);
        assert!(!config.verbose);

        let options = TrainingOptions::from(&args);
        assert_eq!(options.val_size, ValSize::Count(20));
        assert_eq!(options.val_interval, 150);
    }

    #[test]
    fn test_predict_proba_subcommand() {
        let cli = Cli::try_parse_from([
            "lm-finetune", "predict-proba", "--data", "x.jsonl", "--model-dir", "out", "--max-length", "64",
        ])
        .unwrap();
        let Commands::PredictProba(args) = cli.command else { panic!("expected predict-proba") };
        assert_eq!(args.max_length, Some(64));
        assert_eq!(BaseConfig::from(&args).autosave_path, std::path::PathBuf::from("out"));
    }

    #[test]
    fn test_featurize_requires_a_source() {
        assert!(Cli::try_parse_from(["lm-finetune", "featurize", "--data", "x.jsonl"]).is_err());
        assert!(Cli::try_parse_from([
            "lm-finetune", "featurize", "--data", "x.jsonl", "--model-dir", "a", "--tokenizer", "t.json",
        ])
        .is_err());
        assert!(Cli::try_parse_from(["lm-finetune", "featurize", "--data", "x.jsonl", "--tokenizer", "t.json"]).is_ok());
    }

    #[test]
    fn test_bad_val_size_is_rejected() {
        assert!(Cli::try_parse_from(["lm-finetune", "finetune", "--data", "x.jsonl", "--val-size", "1.5"]).is_err());
    }

    #[test]
    fn test_finetune_reuses_autosaved_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        let autosave = dir.path().to_str().unwrap();
        let parse = || {
            let cli = Cli::try_parse_from([
                "lm-finetune", "finetune", "--data", "x.jsonl", "--autosave-dir", autosave, "--vocab-size", "20",
            ])
            .unwrap();
            let Commands::Finetune(args) = cli.command else { panic!("expected finetune") };
            args
        };

        let first = finetune_tokenizer(&parse(), &[vec!["alpha beta".to_string()]]).unwrap();
        assert!(TokenizerStore::new(dir.path()).path().exists());

        // A second run keeps the stored vocabulary instead of rebuilding.
        let second = finetune_tokenizer(&parse(), &[vec!["gamma delta".to_string()]]).unwrap();
        assert_eq!(second.token_to_id("alpha"), first.token_to_id("alpha"));
        assert_eq!(second.token_to_id("gamma"), None);
    }

    #[test]
    fn test_schema_for() {
        let inputs = vec![vec!["a".to_string(), "b".to_string()]];
        assert_eq!(schema_for(&[], &inputs).unwrap().names(), ["input_0", "input_1"]);
        let named = schema_for(&["q".into(), "c".into()], &inputs).unwrap();
        assert_eq!(named.arity(), 2);
    }
}
