//! Derived kinematics
//!
//! Ground speed and track angle from east/north velocity components.

use columnar::RecordBuffer;
use contracts::{columns, DataKind};

/// Speed and track angle (degrees clockwise from north, `[0, 360)`)
pub fn speed_and_track(vx: f64, vy: f64) -> (f64, f64) {
    let track = vx.atan2(vy).to_degrees().rem_euclid(360.0);
    (vx.hypot(vy), if track >= 360.0 { 0.0 } else { track })
}

/// Fill `ground_speed` and `track_deg` of one buffer.
///
/// Skipped when either output already exists or a velocity component is
/// missing. Returns the number of rows derived.
pub fn derive(buffer: &mut RecordBuffer) -> usize {
    if buffer.has_column(columns::GROUND_SPEED) || buffer.has_column(columns::TRACK_DEG) {
        return 0;
    }
    let (Ok(vx), Ok(vy)) = (
        buffer.try_column_ref::<f64>(columns::VX),
        buffer.try_column_ref::<f64>(columns::VY),
    ) else {
        return 0;
    };

    let derived: Vec<(usize, f64, f64)> = (0..buffer.row_count())
        .filter_map(|row| {
            let (vx, vy) = (vx.get(row)?, vy.get(row)?);
            let (speed, track) = speed_and_track(*vx, *vy);
            Some((row, speed, track))
        })
        .collect();

    // both columns are new, so kinds cannot clash
    if buffer.add_column(columns::GROUND_SPEED, DataKind::F64).is_err()
        || buffer.add_column(columns::TRACK_DEG, DataKind::F64).is_err()
    {
        return 0;
    }
    {
        let mut speed = buffer.column::<f64>(columns::GROUND_SPEED);
        for (row, value, _) in &derived {
            speed.set(*row, *value);
        }
    }
    let mut track = buffer.column::<f64>(columns::TRACK_DEG);
    for (row, _, value) in &derived {
        track.set(*row, *value);
    }
    derived.len()
}
