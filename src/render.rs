//! Render composition and pipeline batching.
//!
//! Flows describe what to draw with a [`Render`]. The engine flattens it into
//! one batch per pipeline: back-face culled meshes first, then double sided
//! ones.
//!
//! # Key types
//!
//! - [`Render<'a>`] is the enum describing render operations
//! - [`Instanced<'a>`] contains data for instanced rendering (model + instance buffer)

use crate::data_structures::{model::Model, scene_graph::SceneNode};

/// Data for instanced object rendering: a model and its instance buffer.
pub struct Instanced<'a> {
    pub instance: &'a wgpu::Buffer,
    pub model: &'a Model,
    pub amount: usize,
    /// Drawn without back-face culling.
    pub double_sided: bool,
}

/// Specifies how a scene object should be rendered.
///
/// - `None` renders nothing
/// - `Default(Instanced)` renders a single instanced object
/// - `Defaults(Vec<Instanced>)` renders a batch of instanced objects
/// - `Composed(Vec<Render>)` recursively renders a composition of renders
pub enum Render<'a> {
    None,
    Default(Instanced<'a>),
    Defaults(Vec<Instanced<'a>>),
    Composed(Vec<Render<'a>>),
}

impl<'a> Render<'a> {
    /// Sorts every instanced object into the culled or the double sided batch.
    pub(crate) fn set_pipelines(
        self,
        culled: &mut Vec<Instanced<'a>>,
        double_sided: &mut Vec<Instanced<'a>>,
    ) {
        match self {
            Render::Default(instanced) => sort(instanced, culled, double_sided),
            Render::Defaults(vec) => vec
                .into_iter()
                .for_each(|instanced| sort(instanced, culled, double_sided)),
            Render::Composed(renders) => renders
                .into_iter()
                .for_each(|render| render.set_pipelines(culled, double_sided)),
            Render::None => (),
        }
    }
}

fn sort<'a>(
    instanced: Instanced<'a>,
    culled: &mut Vec<Instanced<'a>>,
    double_sided: &mut Vec<Instanced<'a>>,
) {
    if instanced.amount == 0 {
        log::warn!("you attempted to render something with zero instances");
    } else if instanced.double_sided {
        double_sided.push(instanced);
    } else {
        culled.push(instanced);
    }
}

impl<'a> From<&'a dyn SceneNode> for Render<'a> {
    fn from(sn: &'a dyn SceneNode) -> Self {
        Render::Defaults(sn.get_render())
    }
}
