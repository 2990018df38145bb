use std::fmt::Display;

use nalgebra::zero;
use num_traits::Float;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::boundary_handler::BoundaryBox;
use crate::concurrency::{par_iter_mut1, par_iter_mut2, par_iter_mut3, par_iter_mut4};
use crate::neighborhood_search::{NeighborhoodCache, SpatialHash};
use crate::simulation_parameters::{NeighborhoodSearchAlgorithm, RelaxationMode, SimulationParams};
use crate::sph_kernels::{density_kernel, displacement_weight, near_density_kernel};
use crate::{floating_type_mod::FT, vec2f, V2, V2I};

/// Added to the pairwise distance denominator so that coincident particles
/// (distance exactly zero) produce a zero displacement instead of NaN.
pub const DISTANCE_EPSILON: FT = 1e-9;

macro_rules! decl_particle_vec {
    (pub struct $struct_name:ident { $(pub $field_name:ident: Vec<$field_type:ty> | $default_value:expr),*$(,)?  }) => {
        pub struct $struct_name {
            $(
                pub $field_name : Vec<$field_type>,
            )*
        }

        impl $struct_name {
            pub fn default(len: usize) -> Self {
                Self {
                    $(
                        $field_name: (0..len).map(|_| $default_value).collect::<Vec<$field_type>>(),
                    )*
                }
            }
        }
    }
}

decl_particle_vec! {
    pub struct ParticleVec {
        pub position: Vec<V2> | zero(),
        pub velocity: Vec<V2> | zero(),

        // scratch state, only meaningful while a step is running
        pub position_prev: Vec<V2> | zero(),

        pub density: Vec<FT> | 0.,
        pub density_near: Vec<FT> | 0.,
        pub pressure: Vec<FT> | 0.,
        pub pressure_near: Vec<FT> | 0.,

        // grid cell of the particle, filled by the spatial hash rebuild
        pub cell: Vec<V2I> | zero(),

        // accumulation buffer for RelaxationMode::Buffered
        pub displacement: Vec<V2> | zero(),
    }
}

/// The simulation core. Owns the particle set; collaborators (renderer,
/// exporter, input mapping) only call [`FluidSimulation::step`] and read
/// the snapshot back between steps.
pub struct FluidSimulation {
    particles: ParticleVec,
    neighs: NeighborhoodCache,
    spatial_hash: SpatialHash,

    params: SimulationParams,
    width: FT,
    height: FT,

    running: bool,
    time: FT,
    step_number: usize,
}

impl FluidSimulation {
    /// Creates a paused simulation with `num_particles` particles uniformly
    /// distributed over the domain and velocity components uniform in
    /// [-1, 1]. The same seed always yields the same initial state.
    pub fn new(params: SimulationParams, width: FT, height: FT, num_particles: usize, seed: u64) -> FluidSimulation {
        let (positions, velocities) = random_particles(width, height, num_particles, seed);
        println!("INIT {} FLUID PARTICLES", num_particles);
        FluidSimulation::from_particles(params, width, height, positions, velocities)
    }

    /// Creates a paused simulation from an explicit initial particle state.
    pub fn from_particles(
        params: SimulationParams,
        width: FT,
        height: FT,
        positions: Vec<V2>,
        velocities: Vec<V2>,
    ) -> FluidSimulation {
        params.validate();
        assert!(
            width > 0. && height > 0.,
            "domain size must be positive (is {}x{})",
            width,
            height
        );
        let num_particles = positions.len();
        assert!(
            velocities.len() == num_particles,
            "need one velocity per particle ({} positions, {} velocities)",
            num_particles,
            velocities.len()
        );

        let mut particles = ParticleVec::default(num_particles);
        particles.position = positions;
        particles.velocity = velocities;

        FluidSimulation {
            particles,
            neighs: NeighborhoodCache::new(num_particles),
            spatial_hash: SpatialHash::new(),
            params,
            width,
            height,
            running: false,
            time: 0.,
            step_number: 0,
        }
    }

    pub fn num_particles(&self) -> usize {
        self.particles.position.len()
    }

    /// Read-only position snapshot, ordered by particle index. Valid until
    /// the next `step` call.
    pub fn particles(&self) -> &[V2] {
        &self.particles.position
    }

    /// Full per-particle state for inspection (densities, pressures, ...).
    pub fn particle_data(&self) -> &ParticleVec {
        &self.particles
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn width(&self) -> FT {
        self.width
    }

    pub fn height(&self) -> FT {
        self.height
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Accumulated simulated time.
    pub fn time(&self) -> FT {
        self.time
    }

    pub fn step_number(&self) -> usize {
        self.step_number
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Runs exactly one step from the paused state (paused -> running ->
    /// paused), like the single-step key of an interactive frontend.
    pub fn step_once(&mut self, dt: FT) {
        self.running = true;
        self.step(dt);
        self.running = false;
    }

    /// Updates the boundary extents. Existing particle positions are not
    /// rescaled; particles now outside the new bounds drift back through
    /// the soft boundary correction.
    pub fn resize(&mut self, new_width: FT, new_height: FT) {
        assert!(
            new_width > 0. && new_height > 0.,
            "domain size must be positive (is {}x{})",
            new_width,
            new_height
        );
        self.width = new_width;
        self.height = new_height;
    }

    /// Discards the particle set and recreates it from the given seed.
    /// Parameters, domain size and run state are kept.
    pub fn reset(&mut self, seed: u64) {
        let num_particles = self.num_particles();
        let (positions, velocities) = random_particles(self.width, self.height, num_particles, seed);

        self.particles = ParticleVec::default(num_particles);
        self.particles.position = positions;
        self.particles.velocity = velocities;
        self.neighs = NeighborhoodCache::new(num_particles);
        self.time = 0.;
        self.step_number = 0;
    }

    /// Advances the simulation by one frame. No-op while paused.
    ///
    /// `dt` must be strictly positive: velocities are reconstructed as
    /// position deltas divided by `dt`. The core does not clamp `dt`
    /// either; an oversized timestep lets the relaxation overshoot and
    /// particles explode, so the frame-timing layer must cap `dt` before
    /// calling (capping around 2 frame units works well in practice).
    pub fn step(&mut self, dt: FT) {
        if !self.running {
            return;
        }
        assert!(dt > 0., "step requires dt > 0 (is {})", dt);

        let gravity = self.params.gravity;
        par_iter_mut1(&mut self.particles.velocity, |_, velocity| {
            *velocity += dt * gravity;
        });

        self.apply_viscosity(dt);

        par_iter_mut3(
            &mut self.particles.position,
            &mut self.particles.position_prev,
            &mut self.particles.velocity,
            |_, position, position_prev, velocity| {
                *position_prev = *position;
                *position += dt * *velocity;
            },
        );

        self.adjust_springs(dt);
        self.apply_spring_displacements(dt);
        self.double_density_relaxation(dt);
        self.resolve_collisions(dt);

        par_iter_mut3(
            &mut self.particles.velocity,
            &mut self.particles.position,
            &mut self.particles.position_prev,
            |_, velocity, position, position_prev| {
                *velocity = (*position - *position_prev) / dt;
            },
        );

        self.time += dt;
        self.step_number += 1;
    }

    // Extension points of the viscoelastic-fluid scheme (viscosity impulses
    // and spring adjustment/displacement). Intentionally empty.
    fn apply_viscosity(&mut self, _dt: FT) {}
    fn adjust_springs(&mut self, _dt: FT) {}
    fn apply_spring_displacements(&mut self, _dt: FT) {}

    fn double_density_relaxation(&mut self, dt: FT) {
        let influence_radius = self.params.influence_radius;

        match self.params.neighborhood_search_algorithm {
            NeighborhoodSearchAlgorithm::Grid => {
                self.spatial_hash
                    .rebuild(&self.particles.position, influence_radius, &mut self.particles.cell);
                self.neighs
                    .build_candidates_grid(&self.spatial_hash, &self.particles.cell);
            }
            NeighborhoodSearchAlgorithm::RStar => {
                self.neighs
                    .build_candidates_rstar(&self.particles.position, influence_radius);
            }
        }

        match self.params.relaxation_mode {
            RelaxationMode::InPlace => self.relax_in_place(dt),
            RelaxationMode::Buffered => self.relax_buffered(dt),
        }
    }

    /// Default scheme: particles are processed in index order and each
    /// particle's pass immediately moves its neighbors, so later particles
    /// see positions already corrected by earlier ones. The particle's own
    /// correction is summed over the pass and applied once at the end. This
    /// ordering is part of the observable behavior and must stay
    /// sequential.
    fn relax_in_place(&mut self, dt: FT) {
        let params = self.params;
        let influence_radius = params.influence_radius;

        for i in 0..self.num_particles() {
            let mut density = 0.;
            let mut density_near = 0.;
            for j in self.neighs.iter(i) {
                let q = (self.particles.position[j] - self.particles.position[i]).norm() / influence_radius;
                density += density_kernel(q);
                density_near += near_density_kernel(q);
            }
            let pressure = (density - params.target_density) * params.k_density_to_pressure;
            let pressure_near = density_near * params.k_near_density_to_pressure;
            self.particles.density[i] = density;
            self.particles.density_near[i] = density_near;
            self.particles.pressure[i] = pressure;
            self.particles.pressure_near[i] = pressure_near;

            let mut own_displacement = V2::zeros();
            for j in self.neighs.iter(i) {
                let rij = self.particles.position[j] - self.particles.position[i];
                let dist = rij.norm();
                let q = dist / influence_radius;
                if q < 1. {
                    let displacement =
                        dt * dt * displacement_weight(pressure, pressure_near, q) * rij / (dist + DISTANCE_EPSILON);
                    self.particles.position[j] += 0.5 * displacement;
                    own_displacement -= 0.5 * displacement;
                }
            }
            self.particles.position[i] += own_displacement;
        }
    }

    /// Order-independent variant: densities and pressures for all particles
    /// are evaluated on the frozen predicted positions, then the pairwise
    /// displacements are gathered per particle and applied in one batch.
    /// Parallel and deterministic under any iteration order, but it
    /// produces different trajectories than [`Self::relax_in_place`] (the
    /// symmetrized pair term conserves momentum exactly).
    fn relax_buffered(&mut self, dt: FT) {
        let params = self.params;
        let influence_radius = params.influence_radius;
        let neighs = &self.neighs;

        {
            let ParticleVec {
                position,
                density,
                density_near,
                pressure,
                pressure_near,
                displacement,
                ..
            } = &mut self.particles;
            let position: &[V2] = position;

            par_iter_mut4(
                density,
                density_near,
                pressure,
                pressure_near,
                |i, p_density, p_density_near, p_pressure, p_pressure_near| {
                    let mut density = 0.;
                    let mut density_near = 0.;
                    for j in neighs.iter(i) {
                        let q = (position[j] - position[i]).norm() / influence_radius;
                        density += density_kernel(q);
                        density_near += near_density_kernel(q);
                    }
                    *p_density = density;
                    *p_density_near = density_near;
                    *p_pressure = (density - params.target_density) * params.k_density_to_pressure;
                    *p_pressure_near = density_near * params.k_near_density_to_pressure;
                },
            );

            let pressure: &[FT] = pressure;
            let pressure_near: &[FT] = pressure_near;
            par_iter_mut1(displacement, |i, p_displacement| {
                let mut delta = V2::zeros();
                for j in neighs.iter(i) {
                    let rij = position[j] - position[i];
                    let dist = rij.norm();
                    let q = dist / influence_radius;
                    if q < 1. {
                        let weight = displacement_weight(pressure[i], pressure_near[i], q)
                            + displacement_weight(pressure[j], pressure_near[j], q);
                        delta -= 0.5 * dt * dt * weight * rij / (dist + DISTANCE_EPSILON);
                    }
                }
                *p_displacement = delta;
            });
        }

        par_iter_mut2(
            &mut self.particles.position,
            &mut self.particles.displacement,
            |_, position, displacement| {
                *position += *displacement;
            },
        );
    }

    fn resolve_collisions(&mut self, _dt: FT) {
        let boundary = BoundaryBox::from_params(&self.params, self.width, self.height);
        boundary.resolve(&mut self.particles.position);
    }
}

fn random_particles(width: FT, height: FT, num_particles: usize, seed: u64) -> (Vec<V2>, Vec<V2>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut positions = Vec::with_capacity(num_particles);
    let mut velocities = Vec::with_capacity(num_particles);
    for _ in 0..num_particles {
        positions.push(vec2f(rng.gen::<FT>() * width, rng.gen::<FT>() * height));
        velocities.push(vec2f(rng.gen::<FT>() * 2. - 1., rng.gen::<FT>() * 2. - 1.));
    }
    (positions, velocities)
}

pub fn is_ft_approx_eq<FT: Float>(a: FT, b: FT, tolerance: FT) -> bool {
    (a - b).abs() <= tolerance
}

pub fn assert_ft_approx_eq<FT: Float + Display>(a: FT, b: FT, tolerance: FT, s: impl FnOnce() -> String) {
    if !is_ft_approx_eq(a, b, tolerance) {
        panic!("Assertion '{} == {}' failed (tolerance {}): {}", a, b, tolerance, s());
    }
}
