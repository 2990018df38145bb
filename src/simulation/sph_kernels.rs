use crate::floating_type_mod::FT;

/// Density kernel of the double density relaxation scheme: `(1-q)^2` inside
/// the support, zero outside. `q` is the distance normalized by the
/// influence radius.
pub fn density_kernel(q: FT) -> FT {
    if q < 1. {
        let v = 1. - q;
        v * v
    } else {
        0.
    }
}

/// Near-density kernel: `(1-q)^3` inside the support, zero outside. Steeper
/// than the density kernel close to `q = 0`, which is what produces the
/// extra short-range repulsion.
pub fn near_density_kernel(q: FT) -> FT {
    if q < 1. {
        let v = 1. - q;
        v * v * v
    } else {
        0.
    }
}

/**
 * Scalar magnitude of the pairwise relaxation displacement (without the
 * dt^2 factor): `pressure * (1-q) + near_pressure * (1-q)^2`.
 * Zero outside the kernel support.
 */
pub fn displacement_weight(pressure: FT, near_pressure: FT, q: FT) -> FT {
    if q < 1. {
        let v = 1. - q;
        pressure * v + near_pressure * v * v
    } else {
        0.
    }
}

#[test]
fn kernel_support_cutoff_test() {
    for q in [1., 1.0001, 2., 40.] {
        assert_eq!(density_kernel(q), 0.);
        assert_eq!(near_density_kernel(q), 0.);
        assert_eq!(displacement_weight(3., 7., q), 0.);
    }
}

#[test]
fn kernel_values_test() {
    assert_eq!(density_kernel(0.), 1.);
    assert_eq!(near_density_kernel(0.), 1.);
    assert_eq!(density_kernel(0.5), 0.25);
    assert_eq!(near_density_kernel(0.5), 0.125);

    // both kernels decrease monotonically on [0, 1)
    let samples = 100;
    for i in 1..samples {
        let q0 = (i - 1) as FT / samples as FT;
        let q1 = i as FT / samples as FT;
        assert!(density_kernel(q1) < density_kernel(q0));
        assert!(near_density_kernel(q1) < near_density_kernel(q0));
    }
}

#[test]
fn near_kernel_steeper_test() {
    // the near kernel falls below the density kernel everywhere inside the
    // open support since (1-q)^3 < (1-q)^2 for 0 < q < 1
    for i in 1..100 {
        let q = i as FT / 100.;
        assert!(near_density_kernel(q) < density_kernel(q));
    }
}
