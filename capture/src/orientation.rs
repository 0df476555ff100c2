use yuv_frame::Rotation;

use crate::Facing;

/// Device orientation reported before the sensor has settled.
pub const ORIENTATION_UNKNOWN: i32 = -1;

/// Rotation the camera2 backend applies to the preview so it reads upright
/// for the given display rotation.
pub fn display_rotation_camera2(sensor_orientation: u32, device_rotation: Rotation) -> Rotation {
    let mapped = match device_rotation {
        Rotation::Deg0 => 90,
        Rotation::Deg90 => 0,
        Rotation::Deg180 => 270,
        Rotation::Deg270 => 180,
    };
    Rotation::nearest((mapped + sensor_orientation as i32 + 270) % 360)
}

/// Display orientation for the legacy backend. Front cameras compensate for
/// the mirror the preview already applies.
pub fn display_orientation_legacy(
    sensor_orientation: u32,
    device_rotation: Rotation,
    facing: Facing,
) -> Rotation {
    let sensor = sensor_orientation as i32;
    let degrees = device_rotation.degrees() as i32;
    let result = match facing {
        Facing::Front => (360 - (sensor + degrees) % 360) % 360,
        Facing::Back => (sensor - degrees + 360) % 360,
    };
    Rotation::nearest(result)
}

/// Rotation to record with a still picture, from the raw device orientation
/// in degrees. Unknown orientation yields 0.
pub fn jpeg_orientation(sensor_orientation: u32, device_orientation: i32, facing: Facing) -> u32 {
    if device_orientation == ORIENTATION_UNKNOWN {
        return 0;
    }
    let mut degrees = (device_orientation.rem_euclid(360) + 45) / 90 * 90;
    if facing == Facing::Front {
        degrees = -degrees;
    }
    (sensor_orientation as i32 + degrees + 360).rem_euclid(360) as u32
}
