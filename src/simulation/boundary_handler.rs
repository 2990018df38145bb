use crate::{
    concurrency::par_iter_mut1,
    floating_type_mod::FT,
    simulation_parameters::SimulationParams,
    vec2f, V2,
};

/// Soft rectangular boundary. Out-of-bounds particles are not clamped but
/// pulled back by a fraction of their penetration each step, so a boundary
/// hit decays over a few frames instead of reflecting.
pub struct BoundaryBox {
    pub min: V2,
    pub max: V2,
    pub mul: FT,
}

impl BoundaryBox {
    pub fn from_params(params: &SimulationParams, width: FT, height: FT) -> BoundaryBox {
        BoundaryBox {
            min: params.boundary_min,
            max: vec2f(width, height) - params.boundary_max_diff,
            mul: params.boundary_mul,
        }
    }

    /// Applies the per-axis correction `position += mul * (bound - position)`
    /// on whichever side of the box is violated. No velocity change here:
    /// the step controller reconstructs velocity from the position delta, so
    /// the correction dampens boundary hits on its own.
    pub fn resolve(&self, positions: &mut [V2]) {
        let min = self.min;
        let max = self.max;
        let mul = self.mul;

        par_iter_mut1(positions, |_, position| {
            for d in 0..2 {
                if position[d] < min[d] {
                    position[d] += mul * (min[d] - position[d]);
                } else if position[d] > max[d] {
                    position[d] += mul * (max[d] - position[d]);
                }
            }
        });
    }
}
