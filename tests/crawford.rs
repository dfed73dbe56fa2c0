//! Emission of a dipole near a silver mirror, against the curves published by
//! Crawford, J. Chem. Phys. 89 (10), 1988.

use std::path::Path;
use std::sync::Arc;

use multilayer::medium::Medium;
use multilayer::multilayer::{LayerSpec, Multilayer};
use multilayer::table::{self, TableFormat};

const WAVELENGTH: f64 = 520.0;
const TOL: f64 = 1e-7;

fn load(name: &str) -> Arc<Medium> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("data")
        .join(format!("{}.txt", name));
    Arc::new(table::read_medium(&path, &TableFormat::default(), [0, 1, 2]).unwrap())
}

fn stack(layers: &[(&str, Option<f64>)]) -> Multilayer {
    let specs = layers.iter().map(|(name, thickness)| match thickness {
        Some(thickness) => LayerSpec::Film(load(name), *thickness),
        None => LayerSpec::Medium(load(name)),
    });
    Multilayer::new(specs).unwrap()
}

fn film(thickness: f64) -> Multilayer {
    stack(&[("ambient", None), ("dielectric", Some(thickness)), ("silver", None)])
}

fn no_film() -> Multilayer {
    stack(&[("ambient", None), ("silver", None)])
}

fn check(label: &str, got: f64, expected: f64) {
    assert!(
        (got - expected).abs() < TOL,
        "{}: got {}, expected {}",
        label,
        got,
        expected
    );
}

#[test]
fn figure_2_parallel_dipole() {
    let angle = 65f64.to_radians();

    let mut ml = film(300.0);
    let cases = [
        (-100.0, 4.91930941e-05),
        (0.0, 0.24190098),
        (100.0, 2.54848769),
        (200.0, 0.02325695),
        (300.0, 2.35591136),
        (400.0, 3.82854307),
        (500.0, 3.53145497),
        (600.0, 1.74851184),
        (700.0, 0.18329850),
        (800.0, 0.33136105),
        (900.0, 2.05122719),
    ];
    for (z, expected) in cases {
        let f = ml.calculate_fy(z, WAVELENGTH, angle).unwrap();
        check(&format!("film, z = {}", z), f.norm_sqr(), expected);
    }

    let mut ml = no_film();
    let cases = [
        (-100.0, 1.15413355e-05),
        (0.0, 0.05675309),
        (100.0, 1.38531364),
        (200.0, 3.29590705),
        (300.0, 3.96297991),
        (400.0, 2.74915060),
        (500.0, 0.81422121),
        (600.0, 0.00699794),
        (700.0, 1.09877478),
        (800.0, 3.04636957),
        (900.0, 3.98887445),
    ];
    for (z, expected) in cases {
        let f = ml.calculate_fy(z, WAVELENGTH, angle).unwrap();
        check(&format!("no film, z = {}", z), f.norm_sqr(), expected);
    }
}

#[test]
fn figure_3_perpendicular_dipole() {
    let angle = 65f64.to_radians();

    let mut ml = film(200.0);
    let cases = [
        (-100.0, 3.71093788e-06),
        (0.0, 0.55104199),
        (100.0, 0.06835578),
        (200.0, 3.17735585),
        (300.0, 2.05746777),
        (400.0, 0.51889431),
        (500.0, 0.03172744),
        (600.0, 1.06145038),
    ];
    for (z, expected) in cases {
        let f = ml.calculate_fz(z, WAVELENGTH, angle).unwrap();
        check(&format!("film, z = {}", z), (f * angle.sin()).norm_sqr(), expected);
    }

    let mut ml = no_film();
    let cases = [
        (-100.0, 3.25375474e-06),
        (0.0, 2.13578650),
        (100.0, 0.57832585),
        (200.0, 0.01825289),
        (300.0, 0.99071188),
        (400.0, 2.56652773),
        (500.0, 3.24002371),
        (600.0, 2.36768098),
    ];
    for (z, expected) in cases {
        let f = ml.calculate_fz(z, WAVELENGTH, angle).unwrap();
        check(&format!("no film, z = {}", z), (f * angle.sin()).norm_sqr(), expected);
    }
}

#[test]
fn figure_4_emitter_in_dielectric() {
    let angle = 65f64.to_radians();

    let mut ml = stack(&[("dielectric", None), ("ambient", Some(200.0)), ("silver", None)]);
    let cases = [
        (-100.0, 2.94760736e-07),
        (0.0, 0.26262692),
        (100.0, 0.33368022),
        (200.0, 0.38948285),
        (300.0, 2.58686843),
        (400.0, 3.06396006),
        (500.0, 0.95224614),
        (600.0, 0.09595269),
    ];
    for (z, expected) in cases {
        let f = ml.calculate_fz(z, WAVELENGTH, angle).unwrap();
        check(&format!("film, z = {}", z), (f * angle.sin()).norm_sqr(), expected);
    }

    let mut ml = stack(&[("dielectric", None), ("silver", None)]);
    let cases = [
        (-100.0, 7.40331028e-06),
        (0.0, 1.49218807),
        (100.0, 2.60156534e-04),
        (200.0, 1.45670696),
        (300.0, 3.21016995),
        (400.0, 2.06859361),
        (500.0, 0.11013703),
        (600.0, 0.90003208),
    ];
    for (z, expected) in cases {
        let f = ml.calculate_fz(z, WAVELENGTH, angle).unwrap();
        check(&format!("no film, z = {}", z), (f * angle.sin()).norm_sqr(), expected);
    }
}

#[test]
fn figure_5_angular_distribution() {
    let z = 0.0;
    // the same 50 nm film, whole and split in two
    let mut stacks = [
        film(50.0),
        stack(&[
            ("ambient", None),
            ("dielectric", Some(25.0)),
            ("dielectric", Some(25.0)),
            ("silver", None),
        ]),
    ];

    let fx_cases = [
        (0.0, 0.5576867),
        (0.2, 0.54647638),
        (0.4, 0.5124186),
        (0.6, 0.45436745),
        (0.8, 0.37100651),
        (1.0, 0.26300115),
        (1.2, 0.1402264),
        (1.4, 0.03523924),
        (1.6, 0.00108746),
    ];
    let fy_cases = [
        (0.0, 0.5576867),
        (0.2, 0.5415086),
        (0.4, 0.49379517),
        (0.6, 0.41727818),
        (0.8, 0.31761507),
        (1.0, 0.20546283),
        (1.2, 0.09890071),
        (1.4, 0.0228346),
        (1.6, 0.00068492),
    ];
    let fz_cases = [
        (0.0, 0.0),
        (0.2, 0.05618238),
        (0.4, 0.2004675),
        (0.6, 0.36845438),
        (0.8, 0.47772657),
        (1.0, 0.45862621),
        (1.2, 0.29612175),
        (1.4, 0.08250928),
        (1.6, 0.00261383),
    ];
    for ml in stacks.iter_mut() {
        for (angle, expected) in fx_cases {
            let f = ml.calculate_fx(z, WAVELENGTH, angle).unwrap();
            check(&format!("Fx, film, θ = {}", angle), (f * angle.cos()).norm_sqr(), expected);
        }
        for (angle, expected) in fy_cases {
            let f = ml.calculate_fy(z, WAVELENGTH, angle).unwrap();
            check(&format!("Fy, film, θ = {}", angle), f.norm_sqr(), expected);
        }
        for (angle, expected) in fz_cases {
            let f = ml.calculate_fz(z, WAVELENGTH, angle).unwrap();
            check(&format!("Fz, film, θ = {}", angle), (f * angle.sin()).norm_sqr(), expected);
        }
    }

    let mut ml = no_film();
    let fx_cases = [
        (0.0, 0.31647911),
        (0.2, 0.31638766),
        (0.4, 0.31555465),
        (0.6, 0.31210118),
        (0.8, 0.30196986),
        (1.0, 0.27634856),
        (1.2, 0.214995),
        (1.4, 0.08734856),
        (1.6, 0.00338848),
    ];
    let fy_cases = [
        (0.0, 3.16479113e-01),
        (0.2, 3.04032518e-01),
        (0.4, 2.68641274e-01),
        (0.6, 2.15851575e-01),
        (0.8, 1.53952045e-01),
        (1.0, 9.26880237e-02),
        (1.2, 4.17390122e-02),
        (1.4, 9.19490314e-03),
        (1.6, 2.71727613e-04),
    ];
    let fz_cases = [
        (0.0, 0.0),
        (0.2, 0.14378723),
        (0.4, 0.54571475),
        (0.6, 1.11877807),
        (0.8, 1.7188322),
        (1.0, 2.1302493),
        (1.2, 2.00697),
        (1.4, 0.90407421),
        (1.6, 0.03600333),
    ];
    for (angle, expected) in fx_cases {
        let f = ml.calculate_fx(z, WAVELENGTH, angle).unwrap();
        check(&format!("Fx, no film, θ = {}", angle), (f * angle.cos()).norm_sqr(), expected);
    }
    for (angle, expected) in fy_cases {
        let f = ml.calculate_fy(z, WAVELENGTH, angle).unwrap();
        check(&format!("Fy, no film, θ = {}", angle), f.norm_sqr(), expected);
    }
    for (angle, expected) in fz_cases {
        let f = ml.calculate_fz(z, WAVELENGTH, angle).unwrap();
        check(&format!("Fz, no film, θ = {}", angle), (f * angle.sin()).norm_sqr(), expected);
    }
}
