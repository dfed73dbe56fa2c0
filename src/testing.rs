//! Media shared by the unit tests.

use std::sync::Arc;

use crate::medium::Medium;

fn constant(name: &str, n: f64, k: f64) -> Arc<Medium> {
    let rows: Vec<[f64; 3]> = [300.0, 350.0, 400.0, 500.0, 600.0, 700.0, 800.0]
        .iter()
        .map(|&l| [l, n, k])
        .collect();
    Arc::new(Medium::from_rows(&rows).unwrap().with_name(name))
}

pub fn medium1() -> Arc<Medium> {
    let medium = Medium::from_rows(&[
        [200.0, 2.0, 0.030],
        [250.0, 3.1, 0.025],
        [300.0, 4.2, 0.020],
        [400.0, 4.0, 0.010],
        [500.0, 3.8, 0.050],
        [600.0, 3.7, 0.000],
        [700.0, 3.7, 0.000],
    ])
    .unwrap();
    Arc::new(medium.with_name("medium1"))
}

pub fn medium2() -> Arc<Medium> {
    let medium = Medium::from_rows(&[
        [300.0, 1.0, 1.030],
        [350.0, 2.1, 1.025],
        [400.0, 3.2, 1.020],
        [500.0, 3.0, 1.010],
        [600.0, 2.8, 0.000],
        [700.0, 2.7, 1.000],
        [800.0, 2.7, 1.000],
    ])
    .unwrap();
    Arc::new(medium.with_name("medium2"))
}

/// Lossless everywhere.
pub fn medium4() -> Arc<Medium> {
    let medium = Medium::from_rows(&[
        [300.0, 1.0, 0.0],
        [350.0, 1.1, 0.0],
        [400.0, 1.2, 0.0],
        [500.0, 1.0, 0.0],
        [600.0, 1.8, 0.0],
        [700.0, 1.7, 0.0],
        [800.0, 1.7, 0.0],
    ])
    .unwrap();
    Arc::new(medium.with_name("medium4"))
}

/// Outside the range of every other test medium.
pub fn outcast() -> Arc<Medium> {
    let medium = Medium::from_rows(&[
        [900.0, 2.0, 0.030],
        [910.0, 3.1, 0.025],
        [920.0, 4.2, 0.020],
        [930.0, 4.0, 0.010],
    ])
    .unwrap();
    Arc::new(medium.with_name("outcast"))
}

pub fn ambient() -> Arc<Medium> {
    constant("ambient", 1.0, 0.0)
}

pub fn dielectric() -> Arc<Medium> {
    constant("dielectric", 1.45, 0.0)
}

pub fn silver() -> Arc<Medium> {
    constant("silver", 0.0427, 3.3988)
}
