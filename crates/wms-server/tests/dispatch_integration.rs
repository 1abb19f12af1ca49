//! End-to-end dispatcher tests: raw request bytes in, raw response bytes out,
//! through the same codec the session loop uses.

use std::sync::Arc;
use std::time::Duration;

use wms_core::{
    decode_request, encode_request, encode_response, FixedColorSensor, FrameVariant, ItemColor,
    RobotTimings, SectorId, SectorStore, StatusCode,
};
use wms_server::application::dispatch::{Dispatcher, FrameHandler, Warehouse};
use wms_server::application::robot_control::RobotController;

fn dispatcher(color: ItemColor) -> Dispatcher {
    let robot = RobotController::new(
        RobotTimings {
            move_unit: Duration::from_millis(2),
            default_move: Duration::from_millis(2),
            operate: Duration::from_millis(1),
        },
        Duration::from_millis(1),
    );
    Dispatcher::new(Arc::new(Warehouse::new(
        SectorStore::default(),
        robot,
        Box::new(FixedColorSensor(color)),
    )))
}

async fn exchange(d: &Dispatcher, variant: FrameVariant, command: &str, payload: &[u8]) -> Vec<u8> {
    let bytes = encode_request(variant, command, payload);
    let request = decode_request(variant, &bytes).expect("valid request");
    let response = d.handle(variant, request).await;
    encode_response(variant, &response.command, response.status, &response.payload)
        .expect("encodable response")
}

#[tokio::test]
async fn test_request_all_on_empty_warehouse() {
    let d = dispatcher(ItemColor::Red);

    let bytes = exchange(&d, FrameVariant::Data, "RA", &[]).await;

    let mut expected = b"AU\x00".to_vec();
    expected.extend_from_slice(&[0u8; 14]);
    expected.push(b'\n');
    assert_eq!(bytes, expected);
}

#[tokio::test]
async fn test_unknown_command_is_invalid_cmd_and_changes_nothing() {
    // Arrange
    let d = dispatcher(ItemColor::Red);
    exchange(&d, FrameVariant::Control, "RE", &2u32.to_be_bytes()).await;
    let before = d.warehouse().store().snapshot().unwrap();

    // Act
    let bytes = exchange(&d, FrameVariant::Control, "QQ", &[9, 9, 9, 9]).await;

    // Assert
    assert_eq!(bytes, b"QQ\x02\n".to_vec());
    assert_eq!(d.warehouse().store().snapshot().unwrap(), before);
}

#[tokio::test]
async fn test_zero_quantity_is_invalid_data_on_both_variants() {
    let d = dispatcher(ItemColor::Red);

    assert_eq!(
        exchange(&d, FrameVariant::Control, "RE", &0u32.to_be_bytes()).await,
        b"RE\x03\n".to_vec()
    );
    assert_eq!(
        exchange(&d, FrameVariant::Data, "RI", &[0, 0]).await,
        b"RI\x03\n".to_vec()
    );
}

#[tokio::test]
async fn test_capacity_overflow_leaves_units_in_receiving() {
    // Arrange: every unit is green, shelf holds three.
    let d = dispatcher(ItemColor::Green);

    // Act
    let bytes = exchange(&d, FrameVariant::Control, "RE", &5u32.to_be_bytes()).await;
    let all = exchange(&d, FrameVariant::Control, "AI", &[]).await;

    // Assert
    assert_eq!(bytes, [b"RE\x00".as_slice(), &2u32.to_be_bytes(), b"\n"].concat());
    let stocks: Vec<u32> = all[3..23]
        .chunks(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(stocks, vec![2, 0, 3, 0, 0]);
}

#[tokio::test]
async fn test_classify_into_full_shelf_is_failure() {
    let d = dispatcher(ItemColor::Yellow);
    exchange(&d, FrameVariant::Control, "RE", &4u32.to_be_bytes()).await;

    let bytes = exchange(&d, FrameVariant::Control, "SO", &[0x03]).await;

    assert_eq!(bytes, b"SO\x01\n".to_vec());
    assert_eq!(
        d.warehouse().store().stock(SectorId::YellowStorage).unwrap(),
        3
    );
}

#[tokio::test]
async fn test_ship_items_all_or_nothing() {
    // Arrange: three red in storage.
    let d = dispatcher(ItemColor::Red);
    exchange(&d, FrameVariant::Data, "RI", &[0, 3]).await;

    // Act: asks for one green too, which is not there.
    let refused = exchange(&d, FrameVariant::Data, "SI", &[0, 2, 0, 1, 0, 0]).await;
    let accepted = exchange(&d, FrameVariant::Data, "SI", &[0, 2, 0, 0, 0, 0]).await;

    // Assert
    assert_eq!(refused, b"SI\x01\n".to_vec());
    assert_eq!(accepted, b"SI\x00\n".to_vec());
    let snap = d.warehouse().store().snapshot().unwrap();
    assert_eq!(snap.stock(SectorId::RedStorage), 1);
    assert_eq!(snap.stock(SectorId::Shipping), 2);
    assert_eq!(snap.counters.total_shipped, 2);
}

#[tokio::test]
async fn test_queries_are_idempotent() {
    let d = dispatcher(ItemColor::Red);
    exchange(&d, FrameVariant::Control, "RE", &1u32.to_be_bytes()).await;

    let first = exchange(&d, FrameVariant::Control, "AI", &[]).await;
    let second = exchange(&d, FrameVariant::Control, "AI", &[]).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_concurrent_robot_moves_one_is_busy() {
    // Arrange
    let d = Arc::new(dispatcher(ItemColor::Red));
    let a = Arc::clone(&d);
    let b = Arc::clone(&d);

    // Act
    let (ra, rb) = tokio::join!(
        async move { exchange(&a, FrameVariant::Control, "RM", &[3]).await },
        async move { exchange(&b, FrameVariant::Control, "RM", &[1]).await },
    );

    // Assert
    let statuses = [ra[2], rb[2]];
    assert!(statuses.contains(&(StatusCode::Success as u8)));
    assert!(statuses.contains(&(StatusCode::Failure as u8)));
}
