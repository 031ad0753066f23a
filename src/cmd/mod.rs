//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module     | Commands handled                              |
//! |------------|-----------------------------------------------|
//! | `generate` | `Generate`                                    |
//! | `decode`   | `Decode`                                      |
//! | `config`   | `Config`                                      |
//! | `session`  | (shared session runner and artifact writer)   |

pub mod config;
pub mod decode;
pub mod generate;
pub mod session;

pub use config::cmd_config;
pub use decode::{DecodeArgs, cmd_decode};
pub use generate::{GenerateArgs, cmd_generate};
