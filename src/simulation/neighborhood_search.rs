use rstar::{primitives::GeomWithData, RTree};

use crate::{concurrency::par_iter_mut1, floating_type_mod::FT, vec2i, V2, V2I};

/// Grid cell containing a particle position, per axis `floor(position / cell_size)`.
pub fn cell_index(position: V2, cell_size: FT) -> V2I {
    (position / cell_size).map(|x| x.floor() as i32)
}

/// Uniform grid over the bounding box of the current particle positions,
/// mapping each cell to the indices of the particles inside it. Positions
/// change every step, so the hash is rebuilt from scratch every step rather
/// than updated incrementally.
pub struct SpatialHash {
    cells_min: V2I,
    cells_max: V2I,
    size_x: usize,
    buckets: Vec<Vec<u32>>,
}

impl SpatialHash {
    pub fn new() -> SpatialHash {
        SpatialHash {
            cells_min: vec2i(0, 0),
            cells_max: vec2i(0, 0),
            size_x: 0,
            buckets: Vec::new(),
        }
    }

    /// Clears and repopulates the cell buckets. The cell coordinate of each
    /// particle is written to `cells`, which must have the same length as
    /// `positions`.
    pub fn rebuild(&mut self, positions: &[V2], cell_size: FT, cells: &mut [V2I]) {
        assert!(positions.len() == cells.len());

        if positions.is_empty() {
            self.cells_min = vec2i(0, 0);
            self.cells_max = vec2i(0, 0);
            self.size_x = 0;
            self.buckets.clear();
            return;
        }

        let mut domain_min = positions[0];
        let mut domain_max = positions[0];
        for position in positions {
            for d in 0..2 {
                domain_min[d] = FT::min(domain_min[d], position[d]);
                domain_max[d] = FT::max(domain_max[d], position[d]);
            }
        }

        self.cells_min = cell_index(domain_min, cell_size);
        self.cells_max = cell_index(domain_max, cell_size).map(|x| x + 1);
        let size_x = (self.cells_max[0] - self.cells_min[0]) as usize;
        let size_y = (self.cells_max[1] - self.cells_min[1]) as usize;
        self.size_x = size_x;
        self.buckets.clear();
        self.buckets.resize_with(size_x * size_y, Vec::new);

        for (particle_id, position) in positions.iter().enumerate() {
            let cell = cell_index(*position, cell_size);
            cells[particle_id] = cell;
            let idx = self
                .bucket_idx(cell)
                .expect("particle cell lies inside the grid bounds by construction");
            self.buckets[idx].push(particle_id as u32);
        }
    }

    fn bucket_idx(&self, cell: V2I) -> Option<usize> {
        for d in 0..2 {
            if cell[d] < self.cells_min[d] || cell[d] >= self.cells_max[d] {
                return None;
            }
        }
        let rel = cell - self.cells_min;
        Some(rel[1] as usize * self.size_x + rel[0] as usize)
    }

    /// Particle indices in the given cell; empty for cells outside the grid.
    pub fn bucket(&self, cell: V2I) -> &[u32] {
        match self.bucket_idx(cell) {
            Some(idx) => &self.buckets[idx],
            None => &[],
        }
    }
}

/// Per-particle candidate neighbor lists, rebuilt every step. The lists are
/// a superset of the interacting neighbors; the exact `q < 1` cutoff is
/// applied downstream in the relaxation loops.
pub struct NeighborhoodCache {
    neighs: Vec<Vec<u32>>,
}

impl NeighborhoodCache {
    pub fn new(num_particles: usize) -> Self {
        NeighborhoodCache {
            neighs: (0..num_particles).map(|_| Vec::new()).collect(),
        }
    }

    pub fn iter<'a>(&'a self, i: usize) -> impl Iterator<Item = usize> + 'a {
        self.neighs[i].iter().map(|&x| x as usize)
    }

    pub fn neighbor_count(&self, i: usize) -> usize {
        self.neighs[i].len()
    }

    pub fn len(&self) -> usize {
        self.neighs.len()
    }

    /// Candidates from the particle's own cell and the 8 surrounding cells,
    /// excluding the particle itself. With cell size equal to the influence
    /// radius this square covers every particle that can interact. No
    /// distance filter is applied here on purpose: a candidate outside the
    /// radius at prediction time may still drift inside it while earlier
    /// particles of the relaxation pass move their neighbors.
    pub fn build_candidates_grid(&mut self, hash: &SpatialHash, cells: &[V2I]) {
        par_iter_mut1(&mut self.neighs, |particle_id, p_neighs| {
            p_neighs.clear();

            let cell = cells[particle_id];
            for j in -1..=1 {
                for i in -1..=1 {
                    for &neigh_particle_id in hash.bucket(cell + vec2i(i, j)) {
                        if neigh_particle_id as usize == particle_id {
                            continue;
                        }
                        p_neighs.push(neigh_particle_id);
                    }
                }
            }
        });
    }

    /// Candidates strictly within the influence radius at prediction time,
    /// found through an R-tree. A tighter set than the grid variant.
    pub fn build_candidates_rstar(&mut self, positions: &[V2], influence_radius: FT) {
        type RTreeElem = GeomWithData<[FT; 2], usize>;

        let rtree_elems: Vec<_> = positions
            .iter()
            .enumerate()
            .map(|(idx, position)| RTreeElem::new([position[0], position[1]], idx))
            .collect();
        let rtree = RTree::bulk_load(rtree_elems);

        let max_dist_sq = influence_radius * influence_radius;

        par_iter_mut1(&mut self.neighs, |particle_id, p_neighs| {
            p_neighs.clear();

            let position = positions[particle_id];
            for neigh_point in rtree.locate_within_distance([position[0], position[1]], max_dist_sq) {
                let j = neigh_point.data;
                if j == particle_id {
                    continue;
                }
                p_neighs.push(j as u32);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec2f;

    fn test_positions() -> Vec<V2> {
        vec![
            vec2f(1., 1.),
            vec2f(39., 2.),
            vec2f(41., 2.),
            vec2f(100., 100.),
            vec2f(-10., -70.),
            vec2f(39.5, 2.5),
        ]
    }

    #[test]
    fn every_particle_in_exactly_one_matching_bucket() {
        let positions = test_positions();
        let mut cells = vec![vec2i(0, 0); positions.len()];
        let mut hash = SpatialHash::new();
        hash.rebuild(&positions, 40., &mut cells);

        for (i, position) in positions.iter().enumerate() {
            let cell = cell_index(*position, 40.);
            assert_eq!(cells[i], cell);
            let occurrences = hash.bucket(cell).iter().filter(|&&j| j as usize == i).count();
            assert_eq!(occurrences, 1);

            // not present in any of the surrounding buckets
            for oy in -1..=1 {
                for ox in -1..=1 {
                    if ox == 0 && oy == 0 {
                        continue;
                    }
                    assert!(!hash.bucket(cell + vec2i(ox, oy)).contains(&(i as u32)));
                }
            }
        }
    }

    #[test]
    fn negative_positions_map_to_negative_cells() {
        assert_eq!(cell_index(vec2f(-10., -70.), 40.), vec2i(-1, -2));
        assert_eq!(cell_index(vec2f(0., 39.9), 40.), vec2i(0, 0));
        assert_eq!(cell_index(vec2f(40., 80.), 40.), vec2i(1, 2));
    }

    #[test]
    fn out_of_grid_bucket_is_empty() {
        let positions = vec![vec2f(10., 10.)];
        let mut cells = vec![vec2i(0, 0)];
        let mut hash = SpatialHash::new();
        hash.rebuild(&positions, 40., &mut cells);
        assert!(hash.bucket(vec2i(50, 50)).is_empty());
        assert!(hash.bucket(vec2i(-3, 0)).is_empty());
    }

    #[test]
    fn grid_candidates_contain_all_interacting_pairs() {
        let influence_radius = 40.;
        let positions = test_positions();
        let mut cells = vec![vec2i(0, 0); positions.len()];
        let mut hash = SpatialHash::new();
        hash.rebuild(&positions, influence_radius, &mut cells);

        let mut grid_neighs = NeighborhoodCache::new(positions.len());
        grid_neighs.build_candidates_grid(&hash, &cells);

        let mut rstar_neighs = NeighborhoodCache::new(positions.len());
        rstar_neighs.build_candidates_rstar(&positions, influence_radius);

        for i in 0..positions.len() {
            let grid: Vec<usize> = grid_neighs.iter(i).collect();
            for j in 0..positions.len() {
                if i == j {
                    continue;
                }
                let dist = (positions[i] - positions[j]).norm();
                if dist < influence_radius {
                    assert!(grid.contains(&j), "grid candidates of {} miss {}", i, j);
                    assert!(
                        rstar_neighs.iter(i).any(|k| k == j),
                        "rstar candidates of {} miss {}",
                        i,
                        j
                    );
                }
            }

            // the rstar set is a subset of the grid set
            for j in rstar_neighs.iter(i) {
                assert!(grid.contains(&j));
            }

            assert!(!grid.contains(&i), "particle must not be its own neighbor");
        }
    }

    #[test]
    fn empty_particle_set() {
        let mut hash = SpatialHash::new();
        let mut cells = Vec::new();
        hash.rebuild(&[], 40., &mut cells);
        assert!(hash.bucket(vec2i(0, 0)).is_empty());
    }
}
