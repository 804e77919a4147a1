#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    vista::scene::run(vista::config::SceneConfig::from_env())
}

// The web build starts through `vista::start`.
#[cfg(target_arch = "wasm32")]
fn main() {}
