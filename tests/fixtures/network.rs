//! A small cash network around Henderson, NV.
//!
//! Coordinates are routable points near real bank branches and shopping centres, so the
//! same fixture can be used against an OSRM Nevada extract.

/// A named site with coordinates.
#[derive(Debug, Clone)]
pub struct Site {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Site {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn coords(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }
}

// ============================================================================
// Cash vaults
// ============================================================================

pub const VAULTS: &[Site] = &[
    Site::new("vault-green-valley", 36.0297, -115.0860),
    Site::new("vault-anthem", 35.9745, -115.0987),
];

// ============================================================================
// ATMs
// ============================================================================

pub const ATMS: &[Site] = &[
    Site::new("atm-galleria", 36.0625, -115.0390),
    Site::new("atm-sunset-station", 36.0632, -115.0363),
    Site::new("atm-green-valley-pkwy", 36.0401, -115.0831),
    Site::new("atm-district", 36.0214, -115.0862),
    Site::new("atm-horizon-ridge", 36.0054, -115.1098),
    Site::new("atm-eastern-serene", 36.0155, -115.1178),
    Site::new("atm-anthem-village", 35.9740, -115.0905),
    Site::new("atm-seven-hills", 35.9976, -115.1231),
    Site::new("atm-boulder-hwy", 36.0389, -114.9818),
    Site::new("atm-lake-mead-pkwy", 36.0291, -114.9748),
];
