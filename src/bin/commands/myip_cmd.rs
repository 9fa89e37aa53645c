use anyhow::Result;
use geoatlas::resolve_my_ip;

use crate::cli_utils::print_json;

pub fn cmd_myip(peer: String, forwarded: Option<String>) -> Result<()> {
    print_json(&resolve_my_ip(forwarded.as_deref(), &peer))
}
