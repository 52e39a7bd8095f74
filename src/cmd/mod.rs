//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                         |
//! |------------|------------------------------------------|
//! | `serve`    | `Serve`                                  |
//! | `db`       | `InitDb`, `Clients`, `Stats`             |
//! | `process`  | `Process`, `ProcessPending`              |
//! | `simulate` | `Simulate`                               |
//! | `config`   | `Config`                                 |

pub mod config;
pub mod db;
pub mod process;
pub mod serve;
pub mod simulate;

pub use config::cmd_config;
pub use db::{cmd_clients, cmd_init_db, cmd_stats};
pub use process::{cmd_process, cmd_process_pending};
pub use serve::{ServeArgs, cmd_serve};
pub use simulate::cmd_simulate;
