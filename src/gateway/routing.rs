//! Model routing — an explicit capability table instead of name-prefix
//! inference. Adding a model is a data change, not a conditional-branch change.

/// Which backend serves a given model selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Fast-inference provider (low-latency hosted open models).
    Fast,
    /// Default provider; also the fallback for unrecognized selectors.
    Primary,
    /// Local inference server exposing only a blocking call.
    Local,
}

/// A model's backend plus its supported parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelRoute {
    pub backend: BackendKind,
    /// Whether the provider accepts a sampling temperature for this model.
    pub send_temperature: bool,
}

/// Fixed sampling temperature for every model that accepts one.
pub const DEFAULT_TEMPERATURE: f32 = 0.5;

/// Generation cap applied to every call.
pub const MAX_COMPLETION_TOKENS: u32 = 5000;

/// Selector → route table. Selectors are opaque: an unrecognized name falls
/// through to the default route and is forwarded as-is; any rejection
/// surfaces as a backend error.
const MODEL_ROUTES: &[(&str, ModelRoute)] = &[
    (
        "llama-3.3-70b-versatile",
        ModelRoute { backend: BackendKind::Fast, send_temperature: true },
    ),
    (
        "gemma2-9b-it",
        ModelRoute { backend: BackendKind::Fast, send_temperature: true },
    ),
    (
        "gpt-4o",
        ModelRoute { backend: BackendKind::Primary, send_temperature: true },
    ),
    (
        "gpt-4o-mini",
        ModelRoute { backend: BackendKind::Primary, send_temperature: true },
    ),
    // The provider rejects a temperature parameter for this model; the
    // exception is keyed off the model name, not the backend.
    (
        "o3-mini",
        ModelRoute { backend: BackendKind::Primary, send_temperature: false },
    ),
    (
        "medgemma",
        ModelRoute { backend: BackendKind::Local, send_temperature: true },
    ),
];

const DEFAULT_ROUTE: ModelRoute = ModelRoute {
    backend: BackendKind::Primary,
    send_temperature: true,
};

/// Resolve the route for a model selector (exact-name match, else default).
pub fn route_for(model: &str) -> ModelRoute {
    MODEL_ROUTES
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, route)| *route)
        .unwrap_or(DEFAULT_ROUTE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_models_route_to_fast_backend() {
        for model in ["llama-3.3-70b-versatile", "gemma2-9b-it"] {
            let route = route_for(model);
            assert_eq!(route.backend, BackendKind::Fast);
            assert!(route.send_temperature);
        }
    }

    #[test]
    fn default_models_route_to_primary() {
        for model in ["gpt-4o", "gpt-4o-mini"] {
            let route = route_for(model);
            assert_eq!(route.backend, BackendKind::Primary);
            assert!(route.send_temperature);
        }
    }

    #[test]
    fn exactly_one_route_omits_temperature() {
        let no_temp: Vec<&str> = MODEL_ROUTES
            .iter()
            .filter(|(_, route)| !route.send_temperature)
            .map(|(name, _)| *name)
            .collect();
        assert_eq!(no_temp, vec!["o3-mini"]);
        assert_eq!(route_for("o3-mini").backend, BackendKind::Primary);
    }

    #[test]
    fn unknown_selector_falls_through_to_primary_with_temperature() {
        let route = route_for("some-future-model");
        assert_eq!(route.backend, BackendKind::Primary);
        assert!(route.send_temperature);
    }

    #[test]
    fn local_model_routes_to_local() {
        assert_eq!(route_for("medgemma").backend, BackendKind::Local);
    }
}
