pub mod inspect_cmd;
pub mod myip_cmd;
pub mod query_cmd;
pub mod rebuild_cmd;
pub mod sample_cmd;

pub use inspect_cmd::cmd_inspect;
pub use myip_cmd::cmd_myip;
pub use query_cmd::cmd_query;
pub use rebuild_cmd::cmd_rebuild;
pub use sample_cmd::cmd_sample;
