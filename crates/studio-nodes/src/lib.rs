// studio-nodes/src/lib.rs
// ============================================================================
// Crate: studio-nodes
// Description: The built-in NodeDefinition catalog: value, text generation,
//              image generation, transcription, media ingest, local CLI
//              tool, and prompt template.
// Purpose: Bind each built-in node kind's static shape to its NodeExecutor,
//          wired purely against `studio-core`'s capability traits.
// ============================================================================

//! # studio-nodes
//!
//! Every built-in node kind Studio ships with, each a [`NodeDefinition`]
//! pairing a declared port/config shape with a [`NodeExecutor`]. None of
//! these executors depend on a concrete storage, sandbox, or adapter
//! implementation directly: they reach the outside world exclusively through
//! the [`ServiceBundle`](studio_core::interfaces::ServiceBundle) carried on
//! their [`ExecutionContext`](studio_core::interfaces::ExecutionContext), so
//! `studio-runtime` is free to wire in `studio-store`/`studio-sandbox`/
//! `studio-adapters` (or test doubles) without this crate knowing the
//! difference.

pub mod image_generation;
pub mod local_cli_tool;
pub mod media_ingest;
pub mod prompt_template;
pub mod text_generation;
pub mod transcription;
pub mod value;

mod input;

#[cfg(test)]
mod test_support;

use studio_core::Registry;

/// Builds a [`Registry`] carrying every built-in node definition at version
/// 1: `studio.value`, `studio.media_ingest`, `studio.text_generation`,
/// `studio.image_generation`, `studio.transcription`, `studio.local_cli_tool`,
/// and `studio.prompt_template`.
#[must_use]
pub fn builtin_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(value::definition());
    registry.register(media_ingest::definition());
    registry.register(text_generation::definition());
    registry.register(image_generation::definition());
    registry.register(transcription::definition());
    registry.register(local_cli_tool::definition());
    registry.register(prompt_template::definition());
    registry
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]
mod tests {
    use super::builtin_registry;

    #[test]
    fn registers_all_seven_built_in_kinds() {
        let registry = builtin_registry();
        let kinds: Vec<String> = registry.iter().map(|def| def.kind.to_string()).collect();
        for expected in [
            "studio.value",
            "studio.media_ingest",
            "studio.text_generation",
            "studio.image_generation",
            "studio.transcription",
            "studio.local_cli_tool",
            "studio.prompt_template",
        ] {
            assert!(kinds.iter().any(|k| k == expected), "missing {expected}");
        }
        assert_eq!(kinds.len(), 7);
    }
}
