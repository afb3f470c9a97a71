use serde::{Deserialize, Serialize};

/// A request for `frames` frames of a `width` x `height` smoke simulation.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct FluidRequest {
    pub width: u32,
    pub height: u32,
    pub frames: u32,
    #[serde(default)]
    pub sources: Vec<Source>,
}

/// A rectangle that injects density and sets the velocity inside it on
/// every step.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Source {
    /// Centre of the rectangle, in cells.
    pub position: [f32; 2],
    #[serde(default = "default_source_size")]
    pub size: [f32; 2],
    #[serde(default = "default_source_density")]
    pub density: f32,
    #[serde(default)]
    pub force: [f32; 2],
}

fn default_source_size() -> [f32; 2] {
    [20.0, 20.0]
}

fn default_source_density() -> f32 {
    1.0
}

impl Default for Source {
    fn default() -> Self {
        Self {
            position: [50.0, 25.0],
            size: default_source_size(),
            density: default_source_density(),
            force: [0.0, 30.0],
        }
    }
}

/// One rendered step. `pixels` holds `width * height` density values in
/// `[0, 1]`, row-major.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub frame_id: u32,
    pub pixels: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_without_sources_parses() {
        let request: FluidRequest =
            serde_json::from_str(r#"{"width":100,"height":100,"frames":3}"#).unwrap();

        assert_eq!(request.width, 100);
        assert_eq!(request.frames, 3);
        assert!(request.sources.is_empty());
    }

    #[test]
    fn test_source_fields_default() {
        let source: Source = serde_json::from_str(r#"{"position":[10,12]}"#).unwrap();

        assert_eq!(source.position, [10.0, 12.0]);
        assert_eq!(source.size, [20.0, 20.0]);
        assert_eq!(source.density, 1.0);
        assert_eq!(source.force, [0.0, 0.0]);
    }
}
