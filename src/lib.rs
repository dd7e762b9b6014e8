//! Fine-tune a transformer language model on multi-input text for
//! classification or regression, then predict, predict probabilities
//! or extract pooled features.
//!
//! ```no_run
//! use burn::backend::{Autodiff, NdArray};
//! use lm_finetune::{BaseConfig, InputSchema, LanguageModelGeneralApi, TrainingOptions};
//!
//! # fn main() -> anyhow::Result<()> {
//! let xs = [
//!     ["What is the capital of France?", "Paris is a city in Europe."],
//!     ["What is 2+2?", "Four is a number."],
//! ];
//! let tokenizer = lm_finetune::infra::tokenizer_store::build_word_level(xs.iter().flatten().copied(), 1000)?;
//! let schema = InputSchema::new(["question", "context"])?;
//! let mut api = LanguageModelGeneralApi::<Autodiff<NdArray>>::new(
//!     BaseConfig::default(), schema, tokenizer, Default::default(),
//! )?;
//! api.finetune(&xs, ["yes", "no"], &TrainingOptions::default())?;
//! let labels = api.predict(&xs, None)?;
//! # Ok(())
//! # }
//! ```
#![recursion_limit = "256"]

pub mod application;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod infra;
pub mod ml;

pub use application::{
    base::LanguageModelBase,
    config::{BaseConfig, TrainingOptions, BATCH_SIZE, MAX_LENGTH},
    general_api::LanguageModelGeneralApi,
};
pub use data::{encoder::TokenArrays, splitter::ValSize};
pub use domain::{
    inputs::{InputChannels, InputSchema},
    label::{Label, Labels, TaskState, TaskType},
};
pub use error::{FinetuneError, FinetuneResult};
pub use ml::{inferencer::FeatureMatrix, trainer::TrainingSummary};
