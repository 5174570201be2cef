use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};

use super::*;

const H: Ms = HOUR_MS;
const M: Ms = MINUTE_MS;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("tablebook_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn utc_engine(name: &str) -> Engine {
    let store = Store::open(test_wal_path(name)).unwrap();
    Engine::new(Arc::new(store), FixedOffset::east_opt(0).unwrap())
}

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, 0)
        .unwrap()
}

fn jan1(h: u32, mi: u32) -> NaiveDateTime {
    at(2024, 1, 1, h, mi)
}

fn mins(n: i64) -> TimeDelta {
    TimeDelta::minutes(n)
}

/// 2024-01-01T00:00Z in unix ms.
const JAN1: Ms = 1_704_067_200_000;

// ── Booking scenarios ────────────────────────────────────

#[tokio::test]
async fn smith_jones_lee_on_table_three() {
    let engine = utc_engine("scenario.wal");
    let t3 = engine.add_table(3, 6).await.unwrap();

    let smith = engine
        .create_reservation(BookingRequest::new(t3.id, "Smith", jan1(18, 0), mins(90), 4))
        .await
        .unwrap();
    assert_eq!(smith.status, ReservationStatus::Booked);
    assert_eq!(smith.span, Span::new(JAN1 + 18 * H, JAN1 + 19 * H + 30 * M));

    let jones = engine
        .create_reservation(BookingRequest::new(t3.id, "Jones", jan1(19, 0), mins(60), 2))
        .await;
    match jones {
        Err(EngineError::Conflict { table_id, with }) => {
            assert_eq!(table_id, t3.id);
            assert_eq!(with, smith.id);
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    let lee = engine
        .create_reservation(BookingRequest::new(t3.id, "Lee", jan1(19, 30), mins(60), 2))
        .await
        .unwrap();
    assert_eq!(lee.span.start, smith.span.end);

    let zero = engine
        .create_reservation(BookingRequest::new(t3.id, "Zero", jan1(12, 0), mins(0), 2))
        .await
        .unwrap_err();
    assert_eq!(zero.kind(), ErrorKind::InvalidArgument);

    let big = engine
        .create_reservation(BookingRequest::new(t3.id, "Big", jan1(12, 0), mins(60), 10))
        .await
        .unwrap_err();
    assert!(matches!(
        big,
        EngineError::CapacityExceeded {
            party_size: 10,
            capacity: 6
        }
    ));
    assert_eq!(big.kind(), ErrorKind::InvalidArgument);

    let before = engine.available_tables(jan1(18, 0), mins(90), 4).await.unwrap();
    assert!(before.iter().all(|t| t.id != t3.id));

    assert_eq!(engine.cancel_reservation(smith.id).await.unwrap(), 1);
    let after = engine.available_tables(jan1(18, 0), mins(90), 4).await.unwrap();
    assert!(after.iter().any(|t| t.id == t3.id));
}

#[tokio::test]
async fn create_checks_arguments_before_table() {
    let engine = utc_engine("create_order.wal");
    let missing = Ulid::new();
    let err = engine
        .create_reservation(BookingRequest::new(missing, "X", jan1(18, 0), mins(-5), 2))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = engine
        .create_reservation(BookingRequest::new(missing, "X", jan1(18, 0), mins(30), 2))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TableNotFound(id) if id == missing));
}

#[tokio::test]
async fn capacity_is_checked_before_conflict() {
    let engine = utc_engine("capacity_first.wal");
    let t = engine.add_table(1, 2).await.unwrap();
    engine
        .create_reservation(BookingRequest::new(t.id, "A", jan1(18, 0), mins(60), 2))
        .await
        .unwrap();
    let err = engine
        .create_reservation(BookingRequest::new(t.id, "B", jan1(18, 0), mins(60), 3))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CapacityExceeded { .. }));
}

#[tokio::test]
async fn create_rejects_bad_details() {
    let engine = utc_engine("bad_details.wal");
    let t = engine.add_table(1, 4).await.unwrap();
    let cases = [
        BookingRequest::new(t.id, "A", jan1(18, 0), mins(60), 0),
        BookingRequest::new(t.id, "A", jan1(18, 0), TimeDelta::hours(25), 2),
        BookingRequest::new(t.id, "A", jan1(18, 0), mins(60), 2)
            .with_notes("x".repeat(MAX_NOTES_LEN + 1)),
        BookingRequest::new(t.id, "A", jan1(18, 0), mins(60), 2)
            .with_phone("5".repeat(MAX_PHONE_LEN + 1)),
    ];
    for req in cases {
        let err = engine.create_reservation(req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{err}");
    }
    assert_eq!(engine.store().reservation_count(), 0);
}

#[tokio::test]
async fn blank_name_is_accepted() {
    let engine = utc_engine("blank_name.wal");
    let t = engine.add_table(1, 4).await.unwrap();
    for name in ["", "  "] {
        let r = engine
            .create_reservation(BookingRequest::new(t.id, name, jan1(12, 0), mins(30), 2))
            .await
            .unwrap();
        assert_eq!(engine.reservation(r.id).await.unwrap().name, name);
        engine.cancel_reservation(r.id).await.unwrap();
    }
}

#[tokio::test]
async fn contact_details_are_stored() {
    let engine = utc_engine("contact.wal");
    let t = engine.add_table(1, 4).await.unwrap();
    let r = engine
        .create_reservation(
            BookingRequest::new(t.id, "Ada", jan1(20, 0), mins(45), 2)
                .with_phone("555-0100")
                .with_notes("window seat"),
        )
        .await
        .unwrap();
    let stored = engine.reservation(r.id).await.unwrap();
    assert_eq!(stored.phone.as_deref(), Some("555-0100"));
    assert_eq!(stored.notes.as_deref(), Some("window seat"));
}

#[tokio::test]
async fn local_times_use_configured_offset() {
    let store = Store::open(test_wal_path("offset.wal")).unwrap();
    let engine = Engine::new(Arc::new(store), FixedOffset::east_opt(2 * 3600).unwrap());
    let t = engine.add_table(1, 4).await.unwrap();
    let r = engine
        .create_reservation(BookingRequest::new(t.id, "A", jan1(20, 0), mins(60), 2))
        .await
        .unwrap();
    // 20:00 at UTC+2 is 18:00Z.
    assert_eq!(r.span.start, JAN1 + 18 * H);
}

// ── Conflict engine ──────────────────────────────────────

#[tokio::test]
async fn has_conflict_respects_half_open_bounds() {
    let engine = utc_engine("half_open.wal");
    let t = engine.add_table(1, 4).await.unwrap();
    let r = engine
        .create_reservation(BookingRequest::new(t.id, "A", jan1(18, 0), mins(90), 2))
        .await
        .unwrap();
    let end = r.span.end;
    assert!(!engine.has_conflict(t.id, end, end + H, None).await);
    assert!(engine.has_conflict(t.id, end - 1, end + H, None).await);
    assert!(!engine.has_conflict(t.id, r.span.start, end, Some(r.id)).await);
    assert!(!engine.has_conflict(Ulid::new(), r.span.start, end, None).await);
}

// ── Update ───────────────────────────────────────────────

#[tokio::test]
async fn update_does_not_conflict_with_itself() {
    let engine = utc_engine("self_update.wal");
    let t = engine.add_table(1, 4).await.unwrap();
    let r = engine
        .create_reservation(BookingRequest::new(t.id, "A", jan1(18, 0), mins(60), 2))
        .await
        .unwrap();
    let extended = Reservation {
        span: Span::new(r.span.start, r.span.end + 30 * M),
        ..r.clone()
    };
    let updated = engine.update_reservation(extended.clone(), true).await.unwrap();
    assert_eq!(updated, extended);
    assert_eq!(engine.reservation(r.id).await.unwrap(), extended);
}

#[tokio::test]
async fn update_detects_conflict_with_others() {
    let engine = utc_engine("update_conflict.wal");
    let t = engine.add_table(1, 4).await.unwrap();
    let a = engine
        .create_reservation(BookingRequest::new(t.id, "A", jan1(18, 0), mins(60), 2))
        .await
        .unwrap();
    let b = engine
        .create_reservation(BookingRequest::new(t.id, "B", jan1(19, 0), mins(60), 2))
        .await
        .unwrap();

    let onto_b = Reservation {
        span: Span::new(a.span.start, b.span.start + 1),
        ..a.clone()
    };
    let err = engine.update_reservation(onto_b.clone(), true).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict { with, .. } if with == b.id));
    assert_eq!(engine.reservation(a.id).await.unwrap(), a);

    // Caller bypass.
    engine.update_reservation(onto_b.clone(), false).await.unwrap();
    assert_eq!(engine.reservation(a.id).await.unwrap().span, onto_b.span);
}

#[tokio::test]
async fn update_rejects_inverted_interval() {
    let engine = utc_engine("update_inverted.wal");
    let t = engine.add_table(1, 4).await.unwrap();
    let r = engine
        .create_reservation(BookingRequest::new(t.id, "A", jan1(18, 0), mins(60), 2))
        .await
        .unwrap();
    let bad = Reservation {
        span: Span {
            start: r.span.end,
            end: r.span.start,
        },
        ..r.clone()
    };
    let err = engine.update_reservation(bad, false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn update_rejects_span_too_wide_to_measure() {
    let engine = utc_engine("update_wide.wal");
    let t = engine.add_table(1, 4).await.unwrap();
    let r = engine
        .create_reservation(BookingRequest::new(t.id, "A", jan1(18, 0), mins(60), 2))
        .await
        .unwrap();
    let wide = Reservation {
        span: Span {
            start: i64::MIN / 2 - 10,
            end: i64::MAX / 2 + 10,
        },
        ..r.clone()
    };
    for check in [true, false] {
        let err = engine
            .update_reservation(wide.clone(), check)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{err}");
    }
    assert_eq!(engine.reservation(r.id).await.unwrap(), r);
}

#[tokio::test]
async fn update_unknown_reservation_or_table() {
    let engine = utc_engine("update_missing.wal");
    let t = engine.add_table(1, 4).await.unwrap();
    let r = engine
        .create_reservation(BookingRequest::new(t.id, "A", jan1(18, 0), mins(60), 2))
        .await
        .unwrap();

    let ghost = Reservation {
        id: Ulid::new(),
        ..r.clone()
    };
    let err = engine.update_reservation(ghost, true).await.unwrap_err();
    assert!(matches!(err, EngineError::ReservationNotFound(_)));

    let nowhere = Ulid::new();
    let moved = Reservation {
        table_id: nowhere,
        ..r.clone()
    };
    let err = engine.update_reservation(moved, true).await.unwrap_err();
    assert!(matches!(err, EngineError::TableNotFound(id) if id == nowhere));
}

#[tokio::test]
async fn update_moves_between_tables() {
    let engine = utc_engine("update_move.wal");
    let t1 = engine.add_table(1, 4).await.unwrap();
    let t2 = engine.add_table(2, 4).await.unwrap();
    let r = engine
        .create_reservation(BookingRequest::new(t1.id, "A", jan1(18, 0), mins(60), 2))
        .await
        .unwrap();
    let moved = Reservation {
        table_id: t2.id,
        ..r.clone()
    };
    engine.update_reservation(moved.clone(), true).await.unwrap();

    assert!(!engine.has_conflict(t1.id, r.span.start, r.span.end, None).await);
    assert!(engine.has_conflict(t2.id, r.span.start, r.span.end, None).await);
    assert!(engine.reservations_for_table(t1.id).await.unwrap().is_empty());
    assert_eq!(engine.reservations_for_table(t2.id).await.unwrap(), vec![moved]);
}

#[tokio::test]
async fn update_revalidates_capacity_on_change() {
    let engine = utc_engine("update_capacity.wal");
    let big = engine.add_table(1, 8).await.unwrap();
    let small = engine.add_table(2, 2).await.unwrap();
    let r = engine
        .create_reservation(BookingRequest::new(big.id, "A", jan1(18, 0), mins(60), 6))
        .await
        .unwrap();

    let squeezed = Reservation {
        table_id: small.id,
        ..r.clone()
    };
    let err = engine.update_reservation(squeezed.clone(), true).await.unwrap_err();
    assert!(matches!(err, EngineError::CapacityExceeded { party_size: 6, capacity: 2 }));

    let grown = Reservation {
        party_size: 9,
        ..r.clone()
    };
    let err = engine.update_reservation(grown, true).await.unwrap_err();
    assert!(matches!(err, EngineError::CapacityExceeded { party_size: 9, capacity: 8 }));

    // Unchecked updates skip the gate.
    engine.update_reservation(squeezed, false).await.unwrap();
}

#[tokio::test]
async fn unchanged_party_is_not_recapacitated() {
    let engine = utc_engine("update_same_party.wal");
    let t = engine.add_table(1, 6).await.unwrap();
    let r = engine
        .create_reservation(BookingRequest::new(t.id, "A", jan1(18, 0), mins(60), 6))
        .await
        .unwrap();
    engine.set_table_capacity(t.id, 4).await.unwrap();
    let later = Reservation {
        span: Span::new(r.span.start + H, r.span.end + H),
        ..r.clone()
    };
    engine.update_reservation(later, true).await.unwrap();
}

#[tokio::test]
async fn update_keeps_status_and_rejects_canceled() {
    let engine = utc_engine("update_status.wal");
    let t = engine.add_table(1, 4).await.unwrap();
    let r = engine
        .create_reservation(BookingRequest::new(t.id, "A", jan1(18, 0), mins(60), 2))
        .await
        .unwrap();

    let sneaky = Reservation {
        status: ReservationStatus::Canceled,
        name: "B".into(),
        ..r.clone()
    };
    let updated = engine.update_reservation(sneaky, true).await.unwrap();
    assert_eq!(updated.status, ReservationStatus::Booked);
    assert_eq!(updated.name, "B");

    engine.cancel_reservation(r.id).await.unwrap();
    let err = engine.update_reservation(r, true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

// ── Cancel ───────────────────────────────────────────────

#[tokio::test]
async fn cancel_is_idempotent() {
    let engine = utc_engine("cancel_twice.wal");
    let t = engine.add_table(1, 4).await.unwrap();
    let r = engine
        .create_reservation(BookingRequest::new(t.id, "A", jan1(18, 0), mins(60), 2))
        .await
        .unwrap();
    assert_eq!(engine.cancel_reservation(r.id).await.unwrap(), 1);
    assert_eq!(engine.cancel_reservation(r.id).await.unwrap(), 0);
    assert_eq!(
        engine.reservation(r.id).await.unwrap().status,
        ReservationStatus::Canceled
    );
}

#[tokio::test]
async fn cancel_unknown_is_not_found() {
    let engine = utc_engine("cancel_missing.wal");
    let err = engine.cancel_reservation(Ulid::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn canceled_slot_can_be_rebooked() {
    let engine = utc_engine("rebook.wal");
    let t = engine.add_table(1, 4).await.unwrap();
    let r = engine
        .create_reservation(BookingRequest::new(t.id, "A", jan1(18, 0), mins(60), 2))
        .await
        .unwrap();
    engine.cancel_reservation(r.id).await.unwrap();
    engine
        .create_reservation(BookingRequest::new(t.id, "B", jan1(18, 0), mins(60), 2))
        .await
        .unwrap();
}

// ── Queries ──────────────────────────────────────────────

#[tokio::test]
async fn list_for_day_covers_local_day_in_order() {
    let engine = utc_engine("list_day.wal");
    let t1 = engine.add_table(1, 4).await.unwrap();
    let t2 = engine.add_table(2, 4).await.unwrap();

    let late = engine
        .create_reservation(BookingRequest::new(t1.id, "Late", jan1(21, 0), mins(60), 2))
        .await
        .unwrap();
    let early = engine
        .create_reservation(BookingRequest::new(t2.id, "Early", jan1(12, 0), mins(60), 2))
        .await
        .unwrap();
    let overnight = engine
        .create_reservation(BookingRequest::new(t2.id, "Night", at(2023, 12, 31, 23, 30), mins(60), 2))
        .await
        .unwrap();
    engine
        .create_reservation(BookingRequest::new(t1.id, "Tomorrow", at(2024, 1, 2, 12, 0), mins(60), 2))
        .await
        .unwrap();
    engine.cancel_reservation(early.id).await.unwrap();

    let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let ids: Vec<Ulid> = engine
        .list_for_day(day)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![overnight.id, early.id, late.id]);
}

#[tokio::test]
async fn table_lookups() {
    let engine = utc_engine("table_lookups.wal");
    let t5 = engine.add_table(5, 2).await.unwrap();
    let t1 = engine.add_table(1, 8).await.unwrap();

    assert_eq!(engine.tables().await, vec![t1.clone(), t5.clone()]);
    assert_eq!(engine.table_by_number(5).await, Some(t5.clone()));
    assert_eq!(engine.table(t1.id).await.unwrap(), t1);
    assert!(engine.table_by_number(9).await.is_none());

    let err = engine.add_table(5, 4).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = engine.add_table(6, 0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let resized = engine.set_table_capacity(t5.id, 6).await.unwrap();
    assert_eq!(resized.capacity, 6);
    assert_eq!(engine.table_by_number(5).await, Some(resized));
    let err = engine.set_table_capacity(Ulid::new(), 6).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ── Availability ─────────────────────────────────────────

#[tokio::test]
async fn availability_matches_per_table_conflicts() {
    let engine = utc_engine("availability_equiv.wal");
    let mut tables = Vec::new();
    for (n, cap) in [(1, 2), (2, 4), (3, 6), (4, 4), (5, 8)] {
        tables.push(engine.add_table(n, cap).await.unwrap());
    }
    let bookings = [(0, 18, 0, 90), (1, 19, 0, 60), (3, 17, 0, 60), (4, 20, 30, 60)];
    for (i, h, m, d) in bookings {
        engine
            .create_reservation(BookingRequest::new(tables[i].id, "G", jan1(h, m), mins(d), 2))
            .await
            .unwrap();
    }

    for (h, m, d, min_cap) in [(18, 0, 60, 0), (19, 0, 30, 4), (17, 30, 180, 2), (22, 0, 60, 6)] {
        let start = JAN1 + h as Ms * H + m as Ms * M;
        let end = start + d as Ms * M;
        let mut expected = Vec::new();
        for t in &tables {
            if t.capacity >= min_cap && !engine.has_conflict(t.id, start, end, None).await {
                expected.push(t.clone());
            }
        }
        let got = engine
            .available_tables(jan1(h, m), mins(d), min_cap)
            .await
            .unwrap();
        assert_eq!(got, expected, "window {h}:{m:02} +{d}m cap>={min_cap}");
    }
}

#[tokio::test]
async fn availability_rejects_non_positive_duration() {
    let engine = utc_engine("availability_duration.wal");
    engine.add_table(1, 4).await.unwrap();
    for d in [0, -30] {
        let err = engine
            .available_tables(jan1(18, 0), mins(d), 2)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
    let err = engine
        .available_tables(jan1(18, 0), TimeDelta::days(8), 2)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn availability_rejects_window_too_wide_to_measure() {
    let engine = utc_engine("availability_wide.wal");
    engine.add_table(1, 4).await.unwrap();
    let window = Span {
        start: i64::MIN / 2 - 10,
        end: i64::MAX / 2 + 10,
    };
    let err = engine.available_tables_in(window, 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{err}");
}

// ── Concurrency ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_double_booking_has_one_winner() {
    let engine = Arc::new(utc_engine("double_booking.wal"));
    let table_id = engine.add_table(1, 4).await.unwrap().id;

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let start = jan1(18, (i % 4) * 5);
            engine
                .create_reservation(BookingRequest::new(table_id, format!("G{i}"), start, mins(60), 2))
                .await
        }));
    }

    let mut wins = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => wins += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(engine.store().reservation_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cross_table_moves_do_not_deadlock() {
    let engine = Arc::new(utc_engine("cross_moves.wal"));
    let a = engine.add_table(1, 4).await.unwrap();
    let b = engine.add_table(2, 4).await.unwrap();
    let on_a = engine
        .create_reservation(BookingRequest::new(a.id, "A", jan1(12, 0), mins(60), 2))
        .await
        .unwrap();
    let on_b = engine
        .create_reservation(BookingRequest::new(b.id, "B", jan1(15, 0), mins(60), 2))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let engine = engine.clone();
        let (r, target) = if i % 2 == 0 {
            (on_a.clone(), b.id)
        } else {
            (on_b.clone(), a.id)
        };
        handles.push(tokio::spawn(async move {
            let current = engine.reservation(r.id).await.unwrap();
            let next = if current.table_id == target { r.table_id } else { target };
            engine
                .update_reservation(Reservation { table_id: next, ..current }, true)
                .await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(engine.store().reservation_count(), 2);
    let total = engine.reservations_for_table(a.id).await.unwrap().len()
        + engine.reservations_for_table(b.id).await.unwrap().len();
    assert_eq!(total, 2);
}
