//! Session module for per-user conversation state
//!
//! - `state`: user ids, menu stages and serializable snapshots
//! - `registry`: the per-user records and their awaiting-response slots
//! - `menu`: parsing of commands, menu digits and list selections

pub mod menu;
pub mod registry;
pub mod state;

pub use menu::{
    parse_confirmation, parse_login_command, parse_menu_choice, select_option, Confirmation,
    Credentials, LoginCommand, MenuChoice, MenuOption, Selection,
};
pub use registry::{Reply, ReplyWaiter, SessionRegistry};
pub use state::{AttendanceStep, MenuStage, SessionSnapshot, UserId};
