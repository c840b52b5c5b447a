//! Boundary behavior of the inbound service operations: input validation,
//! tenant refusal and the booking/override invariants.

mod common;

use priceye_core::{EngineError, EntityRef, PropertyId, Strategy, TenantId};
use priceye_engine::{NewBooking, OverrideChange, PricingService};

use common::{build, date, property, tenant};

fn service_with_one_property() -> (PricingService, TenantId) {
    let tenant = tenant();
    let p1 = property("P-1", &tenant, 10_000, 8_000, None, Strategy::Balanced);
    let harness = build(&tenant, vec![p1], "2025-06-01T12:00:00Z", 3, 1_000);
    (PricingService::new(harness.ctx.clone()), tenant)
}

#[tokio::test]
async fn empty_date_range_is_rejected_at_the_boundary() {
    let (service, tenant) = service_with_one_property();
    let result = service
        .get_price_overrides(
            &tenant,
            &PropertyId("P-1".to_string()),
            date("2025-06-10"),
            date("2025-06-10"),
        )
        .await;
    assert!(matches!(result, Err(EngineError::InputInvalid(_))));
}

#[tokio::test]
async fn month_thirteen_is_rejected() {
    let (service, tenant) = service_with_one_property();
    let result =
        service.get_bookings_for_month(&tenant, &PropertyId("P-1".to_string()), 2025, 13).await;
    assert!(matches!(result, Err(EngineError::InputInvalid(_))));
}

#[tokio::test]
async fn nonpositive_override_price_is_rejected() {
    let (service, tenant) = service_with_one_property();
    let result = service
        .update_price_overrides(
            &tenant,
            &PropertyId("P-1".to_string()),
            vec![OverrideChange {
                date: date("2025-06-10"),
                price: 0,
                is_locked: false,
                reason: None,
            }],
        )
        .await;
    assert!(matches!(result, Err(EngineError::InputInvalid(_))));
}

#[tokio::test]
async fn another_tenants_property_is_invisible() {
    let owner = TenantId("T-1".to_string());
    let p1 = property("P-1", &owner, 10_000, 8_000, None, Strategy::Balanced);
    let harness = build(&owner, vec![p1], "2025-06-01T12:00:00Z", 3, 1_000);
    let service = PricingService::new(harness.ctx.clone());

    let intruder = TenantId("T-2".to_string());
    let result = service
        .get_price_overrides(
            &intruder,
            &PropertyId("P-1".to_string()),
            date("2025-06-01"),
            date("2025-06-05"),
        )
        .await;
    // surfaced as an unknown property, never as the other tenant's data
    assert!(result.is_err());
}

#[tokio::test]
async fn overlapping_booking_is_rejected() {
    let (service, tenant) = service_with_one_property();
    let first = NewBooking {
        start_date: date("2025-06-10"),
        end_date_exclusive: date("2025-06-14"),
        price_per_night: 12_000,
        channel: "airbnb".to_string(),
    };
    service
        .add_booking(&tenant, &PropertyId("P-1".to_string()), first)
        .await
        .expect("first booking");

    let overlapping = NewBooking {
        start_date: date("2025-06-13"),
        end_date_exclusive: date("2025-06-16"),
        price_per_night: 11_000,
        channel: "direct".to_string(),
    };
    let result =
        service.add_booking(&tenant, &PropertyId("P-1".to_string()), overlapping).await;
    assert!(result.is_err());

    // a back-to-back stay is fine
    let adjacent = NewBooking {
        start_date: date("2025-06-14"),
        end_date_exclusive: date("2025-06-16"),
        price_per_night: 11_000,
        channel: "direct".to_string(),
    };
    service
        .add_booking(&tenant, &PropertyId("P-1".to_string()), adjacent)
        .await
        .expect("adjacent booking");

    let june = service
        .get_bookings_for_month(&tenant, &PropertyId("P-1".to_string()), 2025, 6)
        .await
        .expect("month listing");
    assert_eq!(june.len(), 2);
}

#[tokio::test]
async fn auto_pricing_status_defaults_to_disabled_idle() {
    let (service, tenant) = service_with_one_property();
    let entity = EntityRef::Property(PropertyId("P-1".to_string()));

    let status = service.get_auto_pricing_status(&tenant, &entity).await.expect("status");
    assert!(!status.enabled);
    assert!(status.last_run_at.is_none());

    let enabled = service
        .set_auto_pricing_enabled(&tenant, &entity, true)
        .await
        .expect("enable");
    assert!(enabled.enabled);

    let reread = service.get_auto_pricing_status(&tenant, &entity).await.expect("status");
    assert!(reread.enabled);
}

#[tokio::test]
async fn unknown_entities_are_input_errors() {
    let (service, tenant) = service_with_one_property();
    let result = service
        .get_auto_pricing_status(&tenant, &EntityRef::Property(PropertyId("P-404".to_string())))
        .await;
    assert!(matches!(result, Err(EngineError::InputInvalid(_))));
}
