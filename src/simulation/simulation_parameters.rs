use crate::{floating_type_mod::FT, vec2f, V2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeighborhoodSearchAlgorithm {
    /// Uniform grid with cell size = influence radius; candidate set is the
    /// full 3x3 cell neighborhood without a distance filter.
    Grid,
    /// R-tree query returning the exact set of particles closer than the
    /// influence radius at prediction time.
    RStar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelaxationMode {
    /// Displacements are applied to neighbor positions while iterating over
    /// the particles. Later particles see positions already moved by earlier
    /// ones; output depends on particle iteration order. The default.
    InPlace,
    /// Displacements for all particles are accumulated into a separate
    /// buffer from frozen predicted positions and applied afterwards.
    /// Order-independent and parallel, but produces different trajectories
    /// than `InPlace`.
    Buffered,
}

/// All simulation parameters. Immutable after construction; create a new
/// simulation to change them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimulationParams {
    pub gravity: V2,

    /// Interaction cutoff distance; also the spatial hash cell size.
    pub influence_radius: FT,

    pub target_density: FT,
    pub k_density_to_pressure: FT,
    pub k_near_density_to_pressure: FT,

    /// Lower boundary per axis.
    pub boundary_min: V2,
    /// Upper boundary per axis, given as distance from the domain extent.
    pub boundary_max_diff: V2,
    /// Fraction of the boundary penetration removed per step.
    pub boundary_mul: FT,

    pub neighborhood_search_algorithm: NeighborhoodSearchAlgorithm,
    pub relaxation_mode: RelaxationMode,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            gravity: vec2f(0., 0.1),
            influence_radius: 40.,
            target_density: 4.,
            k_density_to_pressure: 0.5,
            k_near_density_to_pressure: 0.5,
            boundary_min: vec2f(5., 5.),
            boundary_max_diff: vec2f(5., 5.),
            boundary_mul: 0.5,
            neighborhood_search_algorithm: NeighborhoodSearchAlgorithm::Grid,
            relaxation_mode: RelaxationMode::InPlace,
        }
    }
}

impl SimulationParams {
    /// Fail fast on parameters that would lead to NaN state instead of
    /// producing garbage positions a few thousand steps later.
    pub fn validate(&self) {
        assert!(
            self.influence_radius.is_finite() && self.influence_radius > 0.,
            "influence radius must be positive and finite (is {})",
            self.influence_radius
        );
        assert!(
            self.target_density.is_finite() && self.target_density >= 0.,
            "target density must be non-negative and finite (is {})",
            self.target_density
        );
        assert!(
            self.boundary_mul > 0. && self.boundary_mul <= 1.,
            "boundary correction factor must be in (0, 1] (is {})",
            self.boundary_mul
        );
        assert!(
            self.k_density_to_pressure.is_finite() && self.k_near_density_to_pressure.is_finite(),
            "pressure coefficients must be finite"
        );
        assert!(
            self.gravity[0].is_finite() && self.gravity[1].is_finite(),
            "gravity must be finite"
        );
        assert!(
            self.boundary_min[0].is_finite() && self.boundary_min[1].is_finite(),
            "boundary minimum must be finite"
        );
        assert!(
            self.boundary_max_diff[0].is_finite() && self.boundary_max_diff[1].is_finite(),
            "boundary margin must be finite"
        );
    }
}
