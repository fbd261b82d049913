//! Well-known column names
//!
//! System columns are written by the mapper for every record kind; the rest
//! are read or produced by post-processing when a kind's schema maps them.

/// Unique record key (u64), assigned by the mapper
pub const REC_NUM: &str = "rec_num";

/// Time of day in seconds since midnight (f64)
pub const TOD: &str = "tod";

/// Originating sensor (text)
pub const SENSOR_ID: &str = "sensor_id";

/// Absolute time, milliseconds since the Unix epoch (i64)
pub const TIMESTAMP: &str = "timestamp";

/// Polar measurement: bearing from north in degrees (f64)
pub const BEARING_DEG: &str = "bearing_deg";

/// Polar measurement: slant range in meters (f64)
pub const RANGE_M: &str = "range_m";

/// Target altitude above the ellipsoid in meters (f64)
pub const ALTITUDE_M: &str = "altitude_m";

/// Projected WGS-84 latitude in degrees (f64)
pub const LATITUDE: &str = "latitude";

/// Projected WGS-84 longitude in degrees (f64)
pub const LONGITUDE: &str = "longitude";

/// Velocity east component in m/s (f64)
pub const VX: &str = "vx";

/// Velocity north component in m/s (f64)
pub const VY: &str = "vy";

/// Derived ground speed in m/s (f64)
pub const GROUND_SPEED: &str = "ground_speed";

/// Derived track angle, degrees clockwise from north in `[0, 360)` (f64)
pub const TRACK_DEG: &str = "track_deg";

/// Columns every non-empty mapped buffer carries
pub const SYSTEM: [&str; 2] = [REC_NUM, TOD];
