pub mod types;
mod detokenize;
mod evaluate;
mod filter;

pub use types::{
    Cli, CliModelType, Command, DetokenizeArgs, EvaluateArgs, FilterArgs, SampleArgs,
    TokenizerSpec,
};
pub use detokenize::{cmd_detokenize, parse_id_lines};
pub use evaluate::cmd_evaluate;
pub use filter::{cmd_filter, cmd_sample, read_scores};
