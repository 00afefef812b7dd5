use crate::analysis::geometry::AngleDefinition;
use crate::error::{DancemetricsError, Result};
use crate::landmark::LandmarkId;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DancemetricsConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalysisConfig {
    /// Minimum landmark visibility for a point to take part in angle
    /// computation and overlay drawing
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f64,

    /// Named vertex-angle definitions measured on every frame
    #[serde(default = "default_angle_definitions")]
    pub angle_definitions: Vec<AngleDefinition>,

    /// Per-angle weights for the posture score; unlisted angles weigh 1.0
    #[serde(default)]
    pub angle_weights: HashMap<String, f64>,

    /// A frame whose undefined-measurement fraction exceeds this gets no
    /// posture score
    #[serde(default = "default_max_undefined_fraction")]
    pub max_undefined_fraction: f64,

    /// Per-metric weights for the overall stability score; unlisted
    /// metrics weigh 1.0
    #[serde(default)]
    pub stability_metric_weights: HashMap<String, f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OverlayConfig {
    /// Landmark pairs joined by skeleton lines
    #[serde(default = "default_skeleton_connections")]
    pub skeleton_connections: Vec<(LandmarkId, LandmarkId)>,

    /// RGB color for skeleton lines
    #[serde(default = "default_line_color")]
    pub line_color: (u8, u8, u8),

    /// RGB color for landmark markers
    #[serde(default = "default_marker_color")]
    pub marker_color: (u8, u8, u8),

    /// Landmark marker radius in pixels
    #[serde(default = "default_marker_radius")]
    pub marker_radius: i32,

    /// Draw the per-frame metrics text block
    #[serde(default = "default_metrics_text")]
    pub metrics_text: bool,

    /// Path to a TrueType font for the metrics text; text is skipped when unset
    pub font_path: Option<String>,

    /// Font size for the metrics text
    #[serde(default = "default_font_size")]
    pub font_size: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineConfig {
    /// Sessions whose detection-failure fraction ends above this fail
    /// instead of producing a report
    #[serde(default = "default_max_detection_failure_fraction")]
    pub max_detection_failure_fraction: f64,

    /// Render annotated output frames
    #[serde(default = "default_annotate")]
    pub annotate: bool,

    /// Log a progress line every N processed frames
    #[serde(default = "default_progress_log_interval")]
    pub progress_log_interval: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutputConfig {
    /// Base directory for per-session output
    #[serde(default = "default_output_path")]
    pub path: String,

    /// Write the session report JSON next to the frames
    #[serde(default = "default_save_report")]
    pub save_report: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Session event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl DancemetricsConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self> {
        Self::load_from_file("dancemetrics.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Configuration file (optional; serde defaults fill the gaps)
            .add_source(File::with_name(&path_str).required(false))
            // Environment variables with DANCEMETRICS_ prefix
            .add_source(Environment::with_prefix("DANCEMETRICS").separator("_"))
            .build()?;

        let config: DancemetricsConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Runs before a session starts; a malformed angle or connection table
    /// rejects the session before any frame is processed.
    pub fn validate(&self) -> Result<()> {
        let analysis = &self.analysis;

        if !(0.0..=1.0).contains(&analysis.visibility_threshold) {
            return Err(DancemetricsError::invalid_configuration(
                "analysis.visibility_threshold",
                "must be within [0, 1]",
            ));
        }

        if !(0.0..=1.0).contains(&analysis.max_undefined_fraction) {
            return Err(DancemetricsError::invalid_configuration(
                "analysis.max_undefined_fraction",
                "must be within [0, 1]",
            ));
        }

        if analysis.angle_definitions.is_empty() {
            return Err(DancemetricsError::invalid_configuration(
                "analysis.angle_definitions",
                "at least one angle definition is required",
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for def in &analysis.angle_definitions {
            if def.name.is_empty() {
                return Err(DancemetricsError::invalid_configuration(
                    "analysis.angle_definitions",
                    "angle definition names must not be empty",
                ));
            }
            if !seen.insert(def.name.as_str()) {
                return Err(DancemetricsError::InvalidConfiguration {
                    key: "analysis.angle_definitions".to_string(),
                    details: format!("duplicate angle definition name '{}'", def.name),
                });
            }
            if def.point_a == def.vertex || def.point_b == def.vertex {
                return Err(DancemetricsError::InvalidConfiguration {
                    key: "analysis.angle_definitions".to_string(),
                    details: format!(
                        "angle '{}' reuses its vertex landmark '{}' as an endpoint",
                        def.name, def.vertex
                    ),
                });
            }
            if !(0.0..=180.0).contains(&def.target_degrees) {
                return Err(DancemetricsError::InvalidConfiguration {
                    key: "analysis.angle_definitions".to_string(),
                    details: format!(
                        "angle '{}' target {} is outside [0, 180]",
                        def.name, def.target_degrees
                    ),
                });
            }
        }

        Self::validate_weights("analysis.angle_weights", &analysis.angle_weights, &seen)?;
        Self::validate_weights(
            "analysis.stability_metric_weights",
            &analysis.stability_metric_weights,
            &seen,
        )?;

        for (a, b) in &self.overlay.skeleton_connections {
            if a == b {
                return Err(DancemetricsError::InvalidConfiguration {
                    key: "overlay.skeleton_connections".to_string(),
                    details: format!("connection joins landmark '{}' to itself", a),
                });
            }
        }

        if self.overlay.marker_radius < 1 {
            return Err(DancemetricsError::invalid_configuration(
                "overlay.marker_radius",
                "must be at least 1",
            ));
        }

        if self.overlay.font_size <= 0.0 {
            return Err(DancemetricsError::invalid_configuration(
                "overlay.font_size",
                "must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&self.pipeline.max_detection_failure_fraction) {
            return Err(DancemetricsError::invalid_configuration(
                "pipeline.max_detection_failure_fraction",
                "must be within [0, 1]",
            ));
        }

        if self.pipeline.progress_log_interval == 0 {
            return Err(DancemetricsError::invalid_configuration(
                "pipeline.progress_log_interval",
                "must be greater than 0",
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(DancemetricsError::invalid_configuration(
                "system.event_bus_capacity",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    fn validate_weights(
        key: &str,
        weights: &HashMap<String, f64>,
        known_names: &std::collections::HashSet<&str>,
    ) -> Result<()> {
        for (name, weight) in weights {
            if !known_names.contains(name.as_str()) {
                return Err(DancemetricsError::InvalidConfiguration {
                    key: key.to_string(),
                    details: format!("weight references unknown angle '{}'", name),
                });
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(DancemetricsError::InvalidConfiguration {
                    key: key.to_string(),
                    details: format!("weight for '{}' must be finite and non-negative", name),
                });
            }
        }
        Ok(())
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: default_visibility_threshold(),
            angle_definitions: default_angle_definitions(),
            angle_weights: HashMap::new(),
            max_undefined_fraction: default_max_undefined_fraction(),
            stability_metric_weights: HashMap::new(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            skeleton_connections: default_skeleton_connections(),
            line_color: default_line_color(),
            marker_color: default_marker_color(),
            marker_radius: default_marker_radius(),
            metrics_text: default_metrics_text(),
            font_path: None,
            font_size: default_font_size(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_detection_failure_fraction: default_max_detection_failure_fraction(),
            annotate: default_annotate(),
            progress_log_interval: default_progress_log_interval(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            save_report: default_save_report(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

// Default value functions
fn default_visibility_threshold() -> f64 {
    0.5
}

fn default_angle_definitions() -> Vec<AngleDefinition> {
    vec![
        AngleDefinition::new(
            "left_elbow",
            LandmarkId::LeftShoulder,
            LandmarkId::LeftElbow,
            LandmarkId::LeftWrist,
            90.0,
        ),
        AngleDefinition::new(
            "right_elbow",
            LandmarkId::RightShoulder,
            LandmarkId::RightElbow,
            LandmarkId::RightWrist,
            90.0,
        ),
        AngleDefinition::new(
            "left_knee",
            LandmarkId::LeftHip,
            LandmarkId::LeftKnee,
            LandmarkId::LeftAnkle,
            160.0,
        ),
        AngleDefinition::new(
            "right_knee",
            LandmarkId::RightHip,
            LandmarkId::RightKnee,
            LandmarkId::RightAnkle,
            160.0,
        ),
    ]
}

fn default_max_undefined_fraction() -> f64 {
    0.5
}

fn default_skeleton_connections() -> Vec<(LandmarkId, LandmarkId)> {
    vec![
        (LandmarkId::LeftShoulder, LandmarkId::RightShoulder),
        (LandmarkId::LeftShoulder, LandmarkId::LeftElbow),
        (LandmarkId::LeftElbow, LandmarkId::LeftWrist),
        (LandmarkId::RightShoulder, LandmarkId::RightElbow),
        (LandmarkId::RightElbow, LandmarkId::RightWrist),
        (LandmarkId::LeftShoulder, LandmarkId::LeftHip),
        (LandmarkId::RightShoulder, LandmarkId::RightHip),
        (LandmarkId::LeftHip, LandmarkId::RightHip),
        (LandmarkId::LeftHip, LandmarkId::LeftKnee),
        (LandmarkId::LeftKnee, LandmarkId::LeftAnkle),
        (LandmarkId::RightHip, LandmarkId::RightKnee),
        (LandmarkId::RightKnee, LandmarkId::RightAnkle),
    ]
}

fn default_line_color() -> (u8, u8, u8) {
    (0, 255, 0)
}

fn default_marker_color() -> (u8, u8, u8) {
    (255, 0, 0)
}

fn default_marker_radius() -> i32 {
    3
}

fn default_metrics_text() -> bool {
    true
}

fn default_font_size() -> f32 {
    16.0
}

fn default_max_detection_failure_fraction() -> f64 {
    0.5
}

fn default_annotate() -> bool {
    true
}

fn default_progress_log_interval() -> u64 {
    50
}

fn default_output_path() -> String {
    "./analysis".to_string()
}

fn default_save_report() -> bool {
    true
}

fn default_event_bus_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DancemetricsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.analysis.angle_definitions.len(), 4);
        assert_eq!(config.overlay.skeleton_connections.len(), 12);
    }

    #[test]
    fn test_default_config_roundtrips_through_toml() {
        let config = DancemetricsConfig::default();
        let rendered = toml::to_string(&config).unwrap();
        let parsed: DancemetricsConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(
            parsed.analysis.visibility_threshold,
            config.analysis.visibility_threshold
        );
        assert_eq!(
            parsed.overlay.skeleton_connections,
            config.overlay.skeleton_connections
        );
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut config = DancemetricsConfig::default();
        config.analysis.visibility_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_degenerate_angle_definition() {
        let mut config = DancemetricsConfig::default();
        config.analysis.angle_definitions[0].point_a = config.analysis.angle_definitions[0].vertex;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            DancemetricsError::InvalidConfiguration { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_angle_names() {
        let mut config = DancemetricsConfig::default();
        let dup = config.analysis.angle_definitions[0].clone();
        config.analysis.angle_definitions.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_weight_key() {
        let mut config = DancemetricsConfig::default();
        config
            .analysis
            .stability_metric_weights
            .insert("no_such_angle".to_string(), 1.0);
        let err = config.validate().unwrap_err();
        match err {
            DancemetricsError::InvalidConfiguration { key, .. } => {
                assert_eq!(key, "analysis.stability_metric_weights");
            }
            other => panic!("Unexpected error: {}", other),
        }
    }

    #[test]
    fn test_validate_rejects_self_connection() {
        let mut config = DancemetricsConfig::default();
        config
            .overlay
            .skeleton_connections
            .push((LandmarkId::Nose, LandmarkId::Nose));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dancemetrics.toml");
        std::fs::write(
            &path,
            "[analysis]\nvisibility_threshold = 0.7\n\n[pipeline]\nannotate = false\n",
        )
        .unwrap();

        let config = DancemetricsConfig::load_from_file(&path).unwrap();
        assert_eq!(config.analysis.visibility_threshold, 0.7);
        assert!(!config.pipeline.annotate);
        // Unspecified sections fall back to defaults
        assert_eq!(config.analysis.angle_definitions.len(), 4);
    }
}
