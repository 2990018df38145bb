
pub mod boundary_handler;
pub mod concurrency;
pub mod neighborhood_search;
pub mod simulation;
pub mod simulation_parameters;
pub mod sph_kernels;

pub type IT = i32;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
}

use floating_type_mod::FT;

use nalgebra::SVector;

pub type V<FT, const D: usize> = SVector<FT, D>;

pub type V2 = V<FT, 2>;
pub type V2I = V<IT, 2>;

pub fn vec2f(x: FT, y: FT) -> V2 {
    [x, y].into()
}

pub fn vec2i(x: IT, y: IT) -> V2I {
    [x, y].into()
}

pub use simulation::*;
pub use simulation_parameters::*;
