//! # CLI Module
//!
//! Command-line entry point for the `brrtserve` binary.
//!
//! ## Commands
//!
//! ### `serve` (default)
//!
//! Install requirements, bind the configured handler and serve:
//!
//! ```bash
//! SAGEMAKER_INFERENCE_CODE=echo_handler.handler brrtserve serve --base-directory ./model
//! ```
//!
//! ### `inspect`
//!
//! Locate and classify the handler without installing or serving, and print
//! the resolved configuration as JSON:
//!
//! ```bash
//! brrtserve inspect --base-directory ./model --code echo_handler.handler_async
//! ```
//!
//! Every flag overrides the matching `SAGEMAKER_INFERENCE_*` variable.

mod commands;


pub use commands::{run_cli, Cli, Commands, ServeArgs};
