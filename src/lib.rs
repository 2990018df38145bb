/*!
2D particle fluid simulation based on double density relaxation
(Clavet et al., "Particle-based Viscoelastic Fluid Simulation").

This crate only contains the simulation core: callers drive it through
`FluidSimulation::step` and read particle positions back through
`FluidSimulation::particles`. Rendering, input handling and frame
export are left to the embedding application.
*/

mod simulation;

pub use simulation::*;
