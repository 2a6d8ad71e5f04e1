pub mod apartment;
pub mod cache;
pub mod config;
pub mod error;
pub mod icon_service;
pub mod logging;
pub mod model;
pub mod overlay;
pub mod resolver;
pub mod runtime;
pub mod shell;
pub mod windows_shell;

#[cfg(test)]
mod tests {
    mod cache_hit_latency_test {
        include!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../tests/perf/cache_hit_latency_test.rs"
        ));
    }
}
