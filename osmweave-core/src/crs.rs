//! Coordinate reference systems accepted for source layers.

use std::f64::consts::{FRAC_PI_2, PI};

use geo::Coord;

/// Earth radius used by the spherical Web Mercator projection, in metres.
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Supported source coordinate reference systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// Geographic WGS84 degrees (EPSG:4326).
    Wgs84,
    /// Spherical Web Mercator metres (EPSG:3857).
    WebMercator,
}

impl Crs {
    /// Resolve an EPSG code.
    ///
    /// # Examples
    /// ```
    /// use osmweave_core::Crs;
    ///
    /// assert_eq!(Crs::from_epsg(3857), Some(Crs::WebMercator));
    /// assert_eq!(Crs::from_epsg(27700), None);
    /// ```
    #[must_use]
    pub const fn from_epsg(code: u32) -> Option<Self> {
        match code {
            4326 => Some(Self::Wgs84),
            3857 | 900_913 => Some(Self::WebMercator),
            _ => None,
        }
    }

    /// EPSG code for this system.
    #[must_use]
    pub const fn epsg(self) -> u32 {
        match self {
            Self::Wgs84 => 4326,
            Self::WebMercator => 3857,
        }
    }

    /// Convert a native coordinate to WGS84 longitude/latitude.
    #[must_use]
    pub fn to_wgs84(self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Self::Wgs84 => c,
            Self::WebMercator => Coord {
                x: (c.x / WEB_MERCATOR_RADIUS).to_degrees(),
                y: (2.0 * (c.y / WEB_MERCATOR_RADIUS).exp().atan() - FRAC_PI_2).to_degrees(),
            },
        }
    }

    /// Convert a WGS84 longitude/latitude to native coordinates.
    #[must_use]
    pub fn from_wgs84(self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Self::Wgs84 => c,
            Self::WebMercator => Coord {
                x: c.x.to_radians() * WEB_MERCATOR_RADIUS,
                y: (PI / 4.0 + c.y.to_radians() / 2.0).tan().ln() * WEB_MERCATOR_RADIUS,
            },
        }
    }
}
