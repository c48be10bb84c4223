//! Full ticket lifecycle through the store API.

use chrono::Duration;

use ticketdesk_core::testing::fixtures;
use ticketdesk_core::{
    AddMessageRequest, ChangeStatusRequest, TicketError, TicketPriority, TicketStatus,
    TicketStore,
};

#[test]
fn open_to_closed_with_history() {
    let start = fixtures::reference_time();
    let (store, clock) = fixtures::store_at(start);

    let ticket = store
        .create(fixtures::ticket_request("Mailbox quota exceeded").with_priority(TicketPriority::High))
        .unwrap();
    assert_eq!(ticket.ticket_number, "TKT-2026-0001");
    assert_eq!(ticket.status, TicketStatus::Open);
    assert_eq!(ticket.sla_deadline, Some(start + Duration::hours(8)));

    clock.advance(Duration::minutes(10));
    store
        .change_status(
            &ticket.id,
            ChangeStatusRequest::new(TicketStatus::InProgress, "agent-1"),
        )
        .unwrap();

    clock.advance(Duration::minutes(10));
    store
        .add_message(
            &ticket.id,
            AddMessageRequest::new("agent-1", "Quota raised to 50GB"),
        )
        .unwrap();
    let resolved = store
        .change_status(
            &ticket.id,
            ChangeStatusRequest::new(TicketStatus::Resolved, "agent-1").with_note("quota raised"),
        )
        .unwrap();
    assert_eq!(resolved.resolved_at, Some(start + Duration::minutes(20)));

    clock.advance(Duration::days(2));
    let closed = store
        .change_status(
            &ticket.id,
            ChangeStatusRequest::new(TicketStatus::Closed, "customer-1"),
        )
        .unwrap();
    assert_eq!(closed.status, TicketStatus::Closed);
    assert_eq!(closed.closed_at, Some(start + Duration::minutes(20) + Duration::days(2)));
    assert_eq!(closed.resolved_at, resolved.resolved_at);

    let rated = store.rate(&ticket.id, 5).unwrap();
    assert_eq!(rated.satisfaction_rating, Some(5));

    let detail = store.get_detail(&ticket.id).unwrap();
    assert_eq!(detail.ticket.message_count, 1);
    assert_eq!(detail.messages[0].content, "Quota raised to 50GB");

    let transitions: Vec<_> = detail
        .status_history
        .iter()
        .map(|h| (h.from_status, h.to_status))
        .collect();
    assert_eq!(
        transitions,
        vec![
            (TicketStatus::Open, TicketStatus::InProgress),
            (TicketStatus::InProgress, TicketStatus::Resolved),
            (TicketStatus::Resolved, TicketStatus::Closed),
        ]
    );
    assert_eq!(detail.status_history[1].note.as_deref(), Some("quota raised"));
    assert_eq!(detail.status_history[2].changed_by, "customer-1");

    let err = store
        .change_status(
            &ticket.id,
            ChangeStatusRequest::new(TicketStatus::InProgress, "agent-1"),
        )
        .unwrap_err();
    assert!(matches!(err, TicketError::InvalidTransition { .. }));
    assert_eq!(store.status_history(&ticket.id).unwrap().len(), 3);
}

#[test]
fn waiting_on_client_round_trip() {
    let (store, _) = fixtures::store_at(fixtures::reference_time());
    let id = store.create(fixtures::ticket_request("Need logs")).unwrap().id;

    for status in [
        TicketStatus::InProgress,
        TicketStatus::WaitingOnClient,
        TicketStatus::InProgress,
        TicketStatus::WaitingOnClient,
        TicketStatus::Resolved,
    ] {
        store
            .change_status(&id, ChangeStatusRequest::new(status, "agent-2"))
            .unwrap();
    }

    let ticket = store.get(&id).unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Resolved);
    assert_eq!(store.status_history(&id).unwrap().len(), 5);
}

#[test]
fn same_status_is_rejected() {
    let (store, _) = fixtures::store_at(fixtures::reference_time());
    let id = store.create(fixtures::ticket_request("Noop")).unwrap().id;

    let err = store
        .change_status(&id, ChangeStatusRequest::new(TicketStatus::Open, "agent-1"))
        .unwrap_err();
    match err {
        TicketError::InvalidTransition { ticket_id, from, to } => {
            assert_eq!(ticket_id, id);
            assert_eq!(from, TicketStatus::Open);
            assert_eq!(to, TicketStatus::Open);
        }
        other => panic!("expected invalid transition, got {:?}", other),
    }
}

#[test]
fn operations_on_unknown_ticket_are_not_found() {
    let (store, _) = fixtures::store_at(fixtures::reference_time());

    assert!(matches!(store.messages("nope"), Err(TicketError::NotFound(_))));
    assert!(matches!(store.status_history("nope"), Err(TicketError::NotFound(_))));
    assert!(matches!(store.rate("nope", 3), Err(TicketError::NotFound(_))));
    assert!(matches!(
        store.assign("nope", Some("agent-1".to_string())),
        Err(TicketError::NotFound(_))
    ));
    assert!(matches!(
        store.change_priority("nope", TicketPriority::Low),
        Err(TicketError::NotFound(_))
    ));
}
