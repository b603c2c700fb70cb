use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Default)]
struct ConfigSection {
    arena_size: Option<usize>,
    max_pools: Option<usize>,
}

#[derive(Deserialize, Default)]
struct Config {
    #[serde(default)]
    config: ConfigSection,
}

struct ResolvedConfig {
    arena_size: usize,
    max_pools: usize,
    word_size: usize,
    word_shift: u32,
}

fn resolve_config(cfg: &ConfigSection) -> ResolvedConfig {
    let pointer_width: usize = env::var("CARGO_CFG_TARGET_POINTER_WIDTH")
        .expect("CARGO_CFG_TARGET_POINTER_WIDTH not set")
        .parse()
        .expect("CARGO_CFG_TARGET_POINTER_WIDTH not an integer");
    let word_size = pointer_width / 8;

    let mut arena_size = cfg.arena_size.unwrap_or(2048);

    // The chain-length and loop properties in the test suite need room for
    // thousands of live nodes; target builds keep the configured region.
    if env::var_os("CARGO_FEATURE_TESTING").is_some() {
        arena_size = arena_size.max(8 * 1024 * 1024);
    }

    assert!(arena_size > 0, "arena_size must be > 0");
    assert!(
        arena_size % word_size == 0,
        "arena_size ({}) must be a multiple of the target word size ({})",
        arena_size,
        word_size
    );

    let max_pools = cfg.max_pools.unwrap_or(16);
    assert!(max_pools > 0, "max_pools must be > 0");
    assert!(max_pools <= 256, "max_pools ({}) must be <= 256", max_pools);

    ResolvedConfig {
        arena_size,
        max_pools,
        word_size,
        word_shift: word_size.trailing_zeros(),
    }
}

/// Narrowest unsigned type that can index every word of the region while
/// keeping the all-ones encoding free for the null sentinel.
fn offset_type(words: usize) -> &'static str {
    if words < 0x100 {
        "u8"
    } else if words < 0x1_0000 {
        "u16"
    } else if (words as u64) < 0x1_0000_0000 {
        "u32"
    } else {
        panic!("arena_size too large to offset-encode ({} words)", words);
    }
}

fn generate_config(cfg: &ResolvedConfig, out_path: &Path) {
    let words = cfg.arena_size / cfg.word_size;
    let code = format!(
        "// Auto-generated by build.rs. Do not edit.\n\n\
         /// Capacity of the static backing region, in bytes.\n\
         pub const ARENA_SIZE: usize = {};\n\
         /// Allocation granule and alignment, in bytes (the target word).\n\
         pub const WORD_SIZE: usize = {};\n\
         /// log2(WORD_SIZE); offsets drop this many low bits.\n\
         pub const WORD_SHIFT: usize = {};\n\
         /// Upper bound on distinct slab pools.\n\
         pub const MAX_POOLS: usize = {};\n\
         /// Narrowest unsigned integer indexing every word of the region.\n\
         pub type OffsetRepr = {};\n",
        cfg.arena_size,
        cfg.word_size,
        cfg.word_shift,
        cfg.max_pools,
        offset_type(words),
    );
    fs::write(out_path, code).expect("failed to write config_gen.rs");
}

fn default_config_path() -> String {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    format!("{}/rtpromise.toml", manifest_dir)
}

fn main() {
    println!("cargo:rerun-if-env-changed=RTPROMISE_CONFIG");

    let out_dir = env::var("OUT_DIR").unwrap();

    let config_path = env::var("RTPROMISE_CONFIG").unwrap_or_else(|_| default_config_path());
    println!("cargo:rerun-if-changed={}", config_path);
    let content = fs::read_to_string(&config_path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", config_path, e));

    let config: Config = toml::from_str(&content).expect("failed to parse TOML config");
    let resolved = resolve_config(&config.config);

    generate_config(&resolved, &Path::new(&out_dir).join("config_gen.rs"));
}
