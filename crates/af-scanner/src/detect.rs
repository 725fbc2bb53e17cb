//! Agent-framework detection rules.
//!
//! Three rule families, any hit marks the image as an agent framework:
//! name substrings, framework package installs in layer commands, and
//! control-path files copied into the image.

use crate::LayerRecord;

/// Known framework name fragments checked against the image reference.
const NAME_PATTERNS: &[&str] = &[
    "shade",
    "agent",
    "trading",
    "arbitrage",
    "momentum",
    "market-maker",
];

/// Framework packages looked for inside install commands.
const PACKAGE_PATTERNS: &[&str] = &[
    "shade-agent",
    "agentkit",
    "trading-agent",
    "ccxt",
    "web3",
];

/// Install command prefixes that carry package lists.
const INSTALL_MARKERS: &[&str] = &["pip install", "npm install", "yarn add", "cargo install"];

/// Control-path files whose presence in a COPY/ADD layer marks an agent.
const CONTROL_PATHS: &[&str] = &["/app/agent", "/app/strategy", "/opt/shade"];

pub fn name_matches_framework(image: &str) -> bool {
    let lower = image.to_ascii_lowercase();
    NAME_PATTERNS.iter().any(|p| lower.contains(p))
}

fn command_installs_framework(command: &str) -> bool {
    let lower = command.to_ascii_lowercase();
    INSTALL_MARKERS.iter().any(|m| lower.contains(m))
        && PACKAGE_PATTERNS.iter().any(|p| lower.contains(p))
}

fn command_touches_control_path(command: &str) -> bool {
    let lower = command.to_ascii_lowercase();
    (lower.contains("copy") || lower.contains("add"))
        && CONTROL_PATHS.iter().any(|p| lower.contains(p))
}

/// Apply all rule families.
pub fn detect_agent_framework(image: &str, layers: &[LayerRecord]) -> bool {
    if name_matches_framework(image) {
        return true;
    }

    layers.iter().any(|l| {
        command_installs_framework(&l.command) || command_touches_control_path(&l.command)
    })
}
