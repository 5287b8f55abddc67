//! Nominal drive and E-Stop recovery, end to end.

mod helpers;

use helpers::Rig;
use sil_codec::Direction;
use sil_codec::builders::BrakeMode;
use sil_plant::models::battery::STATUS_NORMAL;
use sil_plant::models::lidar::ZONE_CLEAR;
use sil_protocol::VehicleState;

#[tokio::test]
async fn normal_drive_settles_in_run() {
    let mut rig = Rig::new();
    rig.boot().await;
    rig.settle_normal_drive().await;

    assert_eq!(rig.sim.state(), VehicleState::Run);
    assert!(
        rig.sim.motor.rpm > 1800.0 && rig.sim.motor.rpm < 2200.0,
        "rpm = {}",
        rig.sim.motor.rpm
    );
    assert!(!rig.sim.motor.overcurrent);
    assert_eq!(rig.sim.battery.status(), STATUS_NORMAL);
    assert_eq!(rig.sim.lidar.obstacle_zone(), ZONE_CLEAR);
}

#[tokio::test]
async fn estop_safe_stops_then_reset_recovers() {
    let mut rig = Rig::new();
    rig.boot().await;
    rig.settle_normal_drive().await;
    assert!(rig.sim.motor.rpm > 1800.0);

    rig.send_estop(true);
    rig.ticks(300).await;

    assert_eq!(rig.sim.state(), VehicleState::SafeStop);
    assert!(rig.sim.motor.rpm < 100.0, "rpm = {}", rig.sim.motor.rpm);
    assert!(rig.sim.brake.actual_pct >= 95.0);

    // Clear the E-Stop and zero every command.
    rig.send_estop(false);
    rig.send_torque(0, Direction::Stop);
    rig.send_steer(0.0);
    rig.send_brake(0, BrakeMode::Release);
    rig.ticks(300).await;

    assert_eq!(rig.sim.state(), VehicleState::Run);
    assert!(!rig.sim.motor.has_fault());
    assert!(!rig.sim.steering.fault);
    assert!(!rig.sim.brake.fault);
    assert!(rig.sim.brake.actual_pct < 1.0);
}
