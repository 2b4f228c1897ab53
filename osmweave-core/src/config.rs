//! Settings consumed by the change generator.

use crate::error::ChangeError;
use crate::ids::IdentifierMode;
use crate::model::ElementId;

/// Default cap on points per emitted linear feature.
pub const DEFAULT_MAX_POINTS: usize = 2000;

/// Default tolerance for treating two locations as the same point.
pub const DEFAULT_COINCIDENCE_TOLERANCE: f64 = 1e-9;

/// Generator configuration.
///
/// `coincidence_tolerance` governs exact matching of intersection points to
/// existing points; `distance_buffer` governs cross-layer snapping. The two
/// are independent.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GeneratorConfig {
    /// Detect crossings between features of the primary layer.
    pub self_intersections: bool,
    /// Layers of published features to detect crossings against.
    pub other_layers: Vec<String>,
    /// Near-miss distance for cross-layer detection, in native units.
    pub distance_buffer: f64,
    /// Maximum points per linear feature; `None` disables the limit.
    pub max_points_per_feature: Option<usize>,
    /// First confirmed identifier for imported features.
    pub id_offset: ElementId,
    /// Fail instead of warning when confirmed identifiers starting at
    /// `id_offset` could collide with identifiers in the base map.
    pub forbid_id_collisions: bool,
    /// Synthetic identifiers start just below this value.
    pub synthetic_floor: ElementId,
    /// Identifier scheme for imported features.
    pub identifier_mode: IdentifierMode,
    /// Emit unchanged-geometry features as modifications, not delete+create.
    pub modify_only: bool,
    /// Do not allocate or emit new intersection points.
    pub skip_nodes: bool,
    /// Distance under which two locations are the same point.
    pub coincidence_tolerance: f64,
    /// Tag key prefix listing grouping objects a feature should join.
    pub membership_tag: Option<String>,
    /// Also delete the points of deleted linear features.
    pub delete_points: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            self_intersections: false,
            other_layers: Vec::new(),
            distance_buffer: 0.0,
            max_points_per_feature: Some(DEFAULT_MAX_POINTS),
            id_offset: 0,
            forbid_id_collisions: false,
            synthetic_floor: 0,
            identifier_mode: IdentifierMode::Provisional,
            modify_only: false,
            skip_nodes: false,
            coincidence_tolerance: DEFAULT_COINCIDENCE_TOLERANCE,
            membership_tag: None,
            delete_points: false,
        }
    }
}

impl GeneratorConfig {
    /// Check value ranges.
    ///
    /// # Errors
    /// Returns [`ChangeError::InvalidConfig`] describing the first problem.
    ///
    /// # Examples
    /// ```
    /// use osmweave_core::GeneratorConfig;
    ///
    /// let mut config = GeneratorConfig::default();
    /// assert!(config.validate().is_ok());
    /// config.max_points_per_feature = Some(1);
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ChangeError> {
        let invalid = |reason: &str| {
            Err(ChangeError::InvalidConfig {
                reason: reason.to_owned(),
            })
        };
        if self.max_points_per_feature.is_some_and(|max| max < 2) {
            return invalid("max points per feature must be at least 2");
        }
        if !(self.coincidence_tolerance.is_finite() && self.coincidence_tolerance > 0.0) {
            return invalid("coincidence tolerance must be a positive number");
        }
        if !(self.distance_buffer.is_finite() && self.distance_buffer >= 0.0) {
            return invalid("distance buffer must be a non-negative number");
        }
        if self.synthetic_floor > 0 {
            return invalid("synthetic floor must not be positive");
        }
        if self.identifier_mode == IdentifierMode::Confirmed && self.id_offset < 0 {
            return invalid("confirmed identifiers require a non-negative offset");
        }
        if self.membership_tag.as_deref().is_some_and(str::is_empty) {
            return invalid("membership tag must not be empty");
        }
        if self.other_layers.iter().any(String::is_empty) {
            return invalid("other layer names must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults_are_valid() {
        let config = GeneratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_points_per_feature, Some(DEFAULT_MAX_POINTS));
    }

    #[rstest]
    #[case::zero_tolerance(GeneratorConfig { coincidence_tolerance: 0.0, ..GeneratorConfig::default() })]
    #[case::negative_buffer(GeneratorConfig { distance_buffer: -1.0, ..GeneratorConfig::default() })]
    #[case::nan_buffer(GeneratorConfig { distance_buffer: f64::NAN, ..GeneratorConfig::default() })]
    #[case::positive_floor(GeneratorConfig { synthetic_floor: 4, ..GeneratorConfig::default() })]
    #[case::negative_offset(GeneratorConfig {
        identifier_mode: IdentifierMode::Confirmed,
        id_offset: -3,
        ..GeneratorConfig::default()
    })]
    #[case::empty_tag(GeneratorConfig { membership_tag: Some(String::new()), ..GeneratorConfig::default() })]
    #[case::unnamed_other_layer(GeneratorConfig {
        other_layers: vec!["roads".to_owned(), String::new()],
        ..GeneratorConfig::default()
    })]
    fn invalid_values_are_rejected(#[case] config: GeneratorConfig) {
        assert!(matches!(config.validate(), Err(ChangeError::InvalidConfig { .. })));
    }

    #[rstest]
    fn unlimited_points_are_allowed() {
        let config = GeneratorConfig {
            max_points_per_feature: None,
            ..GeneratorConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
