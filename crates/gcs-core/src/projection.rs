//! Gauss-Krüger zone selection and conversion.
//!
//! Each frame is a 3-degree transverse Mercator zone on the CGCS2000
//! ellipsoid, numbered like the EPSG "3-degree Gauss-Kruger CM" family
//! (code = 4509 + zone). Series expansions follow the USGS formulation and
//! stay well below a millimetre inside the zone.

use serde::{Deserialize, Serialize};

use crate::models::GeoPoint;

const SEMI_MAJOR_M: f64 = 6_378_137.0;
const INVERSE_FLATTENING: f64 = 298.257_222_101;
const FALSE_EASTING_M: f64 = 500_000.0;
const SCALE_FACTOR: f64 = 1.0;
const ZONE_WIDTH_DEG: f64 = 3.0;
const BASE_CODE: i32 = 4509;

/// A planar coordinate system that is locally accurate around one meridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedFrame {
    zone: i32,
}

impl ProjectedFrame {
    /// Frame whose zone contains `lon`.
    pub fn for_longitude(lon: f64) -> Self {
        let zone = ((lon - 1.5) / ZONE_WIDTH_DEG).floor() as i32 + 1;
        Self { zone }
    }

    /// Frame chosen from the mean longitude of `points`.
    pub fn for_points(points: &[GeoPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mean_lon = points.iter().map(|p| p.lon).sum::<f64>() / points.len() as f64;
        Some(Self::for_longitude(mean_lon))
    }

    pub fn zone(&self) -> i32 {
        self.zone
    }

    /// EPSG-style code of the zone.
    pub fn code(&self) -> i32 {
        BASE_CODE + self.zone
    }

    pub fn central_meridian(&self) -> f64 {
        self.zone as f64 * ZONE_WIDTH_DEG
    }

    /// Geographic degrees to planar metres (easting, northing).
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let e2 = eccentricity_squared();
        let ep2 = e2 / (1.0 - e2);

        let phi = lat.to_radians();
        let (sin_phi, cos_phi) = phi.sin_cos();
        let tan_phi = phi.tan();

        let n = SEMI_MAJOR_M / (1.0 - e2 * sin_phi * sin_phi).sqrt();
        let t = tan_phi * tan_phi;
        let c = ep2 * cos_phi * cos_phi;
        let a = (lon - self.central_meridian()).to_radians() * cos_phi;
        let m = meridian_arc(phi, e2);

        let a2 = a * a;
        let a3 = a2 * a;
        let a4 = a3 * a;
        let a5 = a4 * a;
        let a6 = a5 * a;

        let x = SCALE_FACTOR
            * n
            * (a + (1.0 - t + c) * a3 / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a5 / 120.0);
        let y = SCALE_FACTOR
            * (m + n
                * tan_phi
                * (a2 / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0));

        (x + FALSE_EASTING_M, y)
    }

    /// Planar metres back to geographic degrees (lon, lat).
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let e2 = eccentricity_squared();
        let ep2 = e2 / (1.0 - e2);
        let e4 = e2 * e2;
        let e6 = e4 * e2;

        let m = y / SCALE_FACTOR;
        let mu = m / (SEMI_MAJOR_M * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
        let sqrt_1me2 = (1.0 - e2).sqrt();
        let e1 = (1.0 - sqrt_1me2) / (1.0 + sqrt_1me2);
        let e1_2 = e1 * e1;
        let e1_3 = e1_2 * e1;
        let e1_4 = e1_3 * e1;

        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

        let (sin_phi1, cos_phi1) = phi1.sin_cos();
        let tan_phi1 = phi1.tan();
        let denom = 1.0 - e2 * sin_phi1 * sin_phi1;
        let c1 = ep2 * cos_phi1 * cos_phi1;
        let t1 = tan_phi1 * tan_phi1;
        let n1 = SEMI_MAJOR_M / denom.sqrt();
        let r1 = SEMI_MAJOR_M * (1.0 - e2) / denom.powf(1.5);
        let d = (x - FALSE_EASTING_M) / (n1 * SCALE_FACTOR);

        let d2 = d * d;
        let d3 = d2 * d;
        let d4 = d3 * d;
        let d5 = d4 * d;
        let d6 = d5 * d;

        let phi = phi1
            - (n1 * tan_phi1 / r1)
                * (d2 / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d4 / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2
                        - 3.0 * c1 * c1)
                        * d6
                        / 720.0);
        let lambda = (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d5
                / 120.0)
            / cos_phi1;

        (self.central_meridian() + lambda.to_degrees(), phi.to_degrees())
    }
}

fn eccentricity_squared() -> f64 {
    let f = 1.0 / INVERSE_FLATTENING;
    2.0 * f - f * f
}

fn meridian_arc(phi: f64, e2: f64) -> f64 {
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    SEMI_MAJOR_M
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}
