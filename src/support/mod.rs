//! The support desk subsystem.
//!
//! | Module      | Role                                                     |
//! |-------------|----------------------------------------------------------|
//! | `models`    | domain types shared by every layer                       |
//! | `db`        | SQLite storage, migrations and seed data                 |
//! | `seed`      | demo rows inserted into empty tables                     |
//! | `classify`  | keyword fallback classifier and model-reply parsing      |
//! | `template`  | `{{placeholder}}` rendering and canned replies           |
//! | `llm`       | Claude and OpenAI HTTP clients, prompt builders          |
//! | `agent`     | classification, reply drafting and ticket lifecycle      |
//! | `api`       | client and admin JSON routes                             |
//! | `ws`        | dashboard WebSocket feed                                 |
//! | `server`    | router assembly and server startup                       |
//! | `simulator` | synthetic customer traffic                               |

pub mod agent;
pub mod api;
pub mod classify;
pub mod db;
pub mod llm;
pub mod models;
pub mod seed;
pub mod server;
pub mod simulator;
pub mod template;
pub mod ws;
