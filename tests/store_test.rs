mod common;

use common::*;
use modmatch::{
    catalog,
    connections::{self, ConnectionError, ConnectionFilters, Direction, Role},
    enrolment::{self, EnrolmentError},
    identity::{self, IdentityError},
    peers::{self, PeerQuery},
    pagination::Listing,
    status::{ConnectionFilter, ConnectionStatus, EnrolmentStatus, UNENROLLED},
};
use serde_json::json;
use time::Duration;

#[tokio::test]
async fn enrolling_twice_is_rejected() {
    let db_pool = pool().await;
    seed_module(&db_pool, "CS2030", "Programming Methodology II").await;
    let ann = seed_user(&db_pool, "ann", "Ann").await;

    let first = enrolment::enroll(&db_pool, ann.id, "CS2030").await.unwrap();
    assert_eq!(first.status, EnrolmentStatus::Looking);
    assert_eq!(enrolment::get_status(&db_pool, ann.id, "CS2030").await.unwrap(), 0);

    let second = enrolment::enroll(&db_pool, ann.id, "cs2030").await;
    assert!(matches!(second, Err(EnrolmentError::AlreadyEnrolled(_))));
    assert_eq!(enrolment::list_enrolled_modules(&db_pool, ann.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn status_round_trips_and_unenrolled_reads_as_sentinel() {
    let db_pool = pool().await;
    seed_module(&db_pool, "MA1521", "Calculus for Computing").await;
    let ann = seed_user(&db_pool, "ann", "Ann").await;

    assert_eq!(enrolment::get_status(&db_pool, ann.id, "MA1521").await.unwrap(), UNENROLLED);
    assert!(matches!(
        enrolment::set_status(&db_pool, ann.id, "MA1521", 1).await,
        Err(EnrolmentError::NotEnrolled(_))
    ));

    enrolment::enroll(&db_pool, ann.id, "MA1521").await.unwrap();
    enrolment::set_status(&db_pool, ann.id, "MA1521", 1).await.unwrap();
    assert_eq!(enrolment::get_status(&db_pool, ann.id, "MA1521").await.unwrap(), 1);

    assert!(matches!(
        enrolment::set_status(&db_pool, ann.id, "MA1521", 5).await,
        Err(EnrolmentError::InvalidStatus(5))
    ));

    enrolment::unenroll(&db_pool, ann.id, "MA1521").await.unwrap();
    assert_eq!(enrolment::get_status(&db_pool, ann.id, "MA1521").await.unwrap(), UNENROLLED);
    assert!(matches!(
        enrolment::unenroll(&db_pool, ann.id, "MA1521").await,
        Err(EnrolmentError::NotEnrolled(_))
    ));
}

#[tokio::test]
async fn unknown_module_is_not_found() {
    let db_pool = pool().await;
    let ann = seed_user(&db_pool, "ann", "Ann").await;
    assert!(matches!(
        enrolment::enroll(&db_pool, ann.id, "XX0000").await,
        Err(EnrolmentError::ModuleNotFound(_))
    ));
}

#[tokio::test]
async fn a_pair_has_one_connection_per_module_in_either_direction() {
    let db_pool = pool().await;
    seed_module(&db_pool, "CS2030", "Programming Methodology II").await;
    let ann = seed_enrolled(&db_pool, "ann", "Ann", "CS2030", 0).await;
    let ben = seed_enrolled(&db_pool, "ben", "Ben", "CS2030", 0).await;

    connections::request(&db_pool, ann.id, ben.id, "CS2030", now()).await.unwrap();
    let reverse = connections::request(&db_pool, ben.id, ann.id, "CS2030", now()).await;
    assert!(matches!(reverse, Err(ConnectionError::AlreadyConnected(_))));
    let again = connections::request(&db_pool, ann.id, ben.id, "cs2030", now()).await;
    assert!(matches!(again, Err(ConnectionError::AlreadyConnected(_))));
}

#[tokio::test]
async fn requests_need_an_enrolled_target_other_than_yourself() {
    let db_pool = pool().await;
    seed_module(&db_pool, "CS2030", "Programming Methodology II").await;
    let ann = seed_enrolled(&db_pool, "ann", "Ann", "CS2030", 0).await;
    let ben = seed_user(&db_pool, "ben", "Ben").await;

    assert!(matches!(
        connections::request(&db_pool, ann.id, ann.id, "CS2030", now()).await,
        Err(ConnectionError::SelfConnection)
    ));
    assert!(matches!(
        connections::request(&db_pool, ann.id, ben.id, "CS2030", now()).await,
        Err(ConnectionError::TargetNotEnrolled { .. })
    ));
}

#[tokio::test]
async fn only_the_accepter_can_accept() {
    let db_pool = pool().await;
    seed_module(&db_pool, "CS2030", "Programming Methodology II").await;
    let ann = seed_enrolled(&db_pool, "ann", "Ann", "CS2030", 0).await;
    let ben = seed_enrolled(&db_pool, "ben", "Ben", "CS2030", 0).await;
    let cat = seed_enrolled(&db_pool, "cat", "Cat", "CS2030", 0).await;

    let pending = connections::request(&db_pool, ann.id, ben.id, "CS2030", now()).await.unwrap();

    assert!(matches!(
        connections::respond(&db_pool, pending.id, ann.id, ConnectionStatus::Accepted).await,
        Err(ConnectionError::SelfAccept)
    ));
    assert!(matches!(
        connections::respond(&db_pool, pending.id, cat.id, ConnectionStatus::Accepted).await,
        Err(ConnectionError::NotParticipant(_))
    ));

    let accepted = connections::respond(&db_pool, pending.id, ben.id, ConnectionStatus::Accepted)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(accepted.status, ConnectionStatus::Accepted);
    assert!(matches!(
        connections::respond(&db_pool, pending.id, ben.id, ConnectionStatus::Pending).await,
        Err(ConnectionError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn rejecting_clears_the_way_for_a_new_request() {
    let db_pool = pool().await;
    seed_module(&db_pool, "CS2030", "Programming Methodology II").await;
    let ann = seed_enrolled(&db_pool, "ann", "Ann", "CS2030", 0).await;
    let ben = seed_enrolled(&db_pool, "ben", "Ben", "CS2030", 0).await;

    let pending = connections::request(&db_pool, ann.id, ben.id, "CS2030", now()).await.unwrap();
    let rejected = connections::respond(&db_pool, pending.id, ben.id, ConnectionStatus::Rejected).await.unwrap();
    assert!(rejected.is_none());
    assert_eq!(connections::status_between(&db_pool, ann.id, ben.id, "CS2030").await.unwrap(), None);
    assert!(matches!(
        connections::find_connection(&db_pool, pending.id).await,
        Err(ConnectionError::NotFound(_))
    ));

    connections::request(&db_pool, ben.id, ann.id, "CS2030", now()).await.unwrap();
}

#[tokio::test]
async fn listing_reports_direction_and_filters_by_role() {
    let db_pool = pool().await;
    seed_module(&db_pool, "CS2030", "Programming Methodology II").await;
    seed_module(&db_pool, "MA1521", "Calculus for Computing").await;
    let ann = seed_enrolled(&db_pool, "ann", "Ann", "CS2030", 0).await;
    let ben = seed_enrolled(&db_pool, "ben", "Ben", "CS2030", 0).await;
    enrolment::enroll(&db_pool, ann.id, "MA1521").await.unwrap();

    let first = connections::request(&db_pool, ann.id, ben.id, "CS2030", now()).await.unwrap();
    connections::request(&db_pool, ben.id, ann.id, "MA1521", now() + Duration::seconds(1)).await.unwrap();

    let all = connections::list_for_user(&db_pool, ann.id, &ConnectionFilters::default()).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].connection.id, first.id);
    assert_eq!(all[0].direction, Direction::Outgoing);
    assert_eq!(all[0].counterpart.id, ben.id);
    assert_eq!(all[1].direction, Direction::Incoming);

    let incoming = ConnectionFilters { role: Some(Role::Incoming), module: None };
    let listed = connections::list_for_user(&db_pool, ann.id, &incoming).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].module.module_code, "MA1521");

    let by_title = ConnectionFilters { role: None, module: Some("methodology".into()) };
    assert_eq!(connections::list_for_user(&db_pool, ann.id, &by_title).await.unwrap().len(), 1);
}

#[tokio::test]
async fn not_looking_users_are_never_listed() {
    let db_pool = pool().await;
    seed_module(&db_pool, "CS2030", "Programming Methodology II").await;
    let ann = seed_enrolled(&db_pool, "ann", "Ann", "CS2030", 0).await;
    seed_enrolled(&db_pool, "ben", "Ben", "CS2030", 2).await;
    let cat = seed_enrolled(&db_pool, "cat", "Cat", "CS2030", 1).await;

    let everyone = peers::list_module_peers(&db_pool, ann.id, "CS2030", &PeerQuery::default()).await.unwrap();
    let ids: Vec<i64> = everyone.results().iter().map(|p| p.profile.id).collect();
    assert_eq!(ids, vec![cat.id]);

    let asked = PeerQuery { user_status: Some(EnrolmentStatus::NotLooking), ..Default::default() };
    let listed = peers::list_module_peers(&db_pool, ann.id, "CS2030", &asked).await.unwrap();
    assert!(listed.results().is_empty());
}

#[tokio::test]
async fn accepting_reveals_contacts_in_the_peer_listing() {
    let db_pool = pool().await;
    seed_module(&db_pool, "CS2030", "Programming Methodology II").await;
    let ann = seed_enrolled(&db_pool, "ann", "Ann", "CS2030", 0).await;
    let ben = seed_enrolled(&db_pool, "ben", "Ben", "CS2030", 1).await;

    let before = peers::list_module_peers(&db_pool, ann.id, "CS2030", &PeerQuery::default()).await.unwrap();
    let peer = &before.results()[0];
    assert_eq!(peer.connection_status, 0);
    assert_eq!(peer.user_status, 1);
    assert!(peer.profile.telegram_id.is_empty());

    let pending = connections::request(&db_pool, ann.id, ben.id, "CS2030", now()).await.unwrap();
    let waiting = PeerQuery { connection_status: Some(ConnectionFilter::Pending), ..Default::default() };
    let listed = peers::list_module_peers(&db_pool, ann.id, "CS2030", &waiting).await.unwrap();
    assert_eq!(listed.results()[0].connection_status, 1);

    connections::respond(&db_pool, pending.id, ben.id, ConnectionStatus::Accepted).await.unwrap();
    let after = peers::list_module_peers(&db_pool, ann.id, "CS2030", &PeerQuery::default()).await.unwrap();
    let peer = &after.results()[0];
    assert_eq!(peer.connection_status, 2);
    assert_eq!(peer.profile.telegram_id, "@ben");
    assert_eq!(peer.profile.nus_email, "ben@nus.edu");
}

#[tokio::test]
async fn peer_pages_hold_ten() {
    let db_pool = pool().await;
    seed_module(&db_pool, "CS2030", "Programming Methodology II").await;
    let ann = seed_enrolled(&db_pool, "ann", "Ann", "CS2030", 0).await;
    for i in 0..12 {
        seed_enrolled(&db_pool, &format!("peer{i}"), &format!("Peer {i}"), "CS2030", 0).await;
    }

    let second = PeerQuery { page: Some(2), ..Default::default() };
    match peers::list_module_peers(&db_pool, ann.id, "CS2030", &second).await.unwrap() {
        Listing::Paged(page) => {
            assert_eq!(page.count, 12);
            assert_eq!(page.results.len(), 2);
            assert_eq!(page.next, None);
            assert_eq!(page.previous, Some(1));
        }
        Listing::All(_) => panic!("expected a page"),
    }

    let past_end = PeerQuery { page: Some(3), ..Default::default() };
    assert!(peers::list_module_peers(&db_pool, ann.id, "CS2030", &past_end).await.is_err());
}

#[tokio::test]
async fn otp_verifies_once() {
    let db_pool = pool().await;
    let user = identity::register(
        &db_pool,
        &settings(),
        identity::NewUser {
            nus_email: "Dee@NUS.edu".into(),
            password: PASSWORD.into(),
            name: "Dee".into(),
            year: 1,
            major: String::new(),
        },
        now(),
    )
    .await
    .unwrap();
    assert_eq!(user.nus_email, "Dee@nus.edu");
    assert!(!user.is_verified);

    identity::issue_code(&db_pool, user.id, "123456", now(), 60).await.unwrap();
    assert!(matches!(
        identity::verify_code(&db_pool, &user.nus_email, "654321", now(), 300).await,
        Err(IdentityError::WrongCode)
    ));

    let verified = identity::verify_code(&db_pool, &user.nus_email, "123456", now(), 300).await.unwrap();
    assert!(verified.is_verified);
    assert!(matches!(
        identity::verify_code(&db_pool, &user.nus_email, "123456", now(), 300).await,
        Err(IdentityError::WrongCode)
    ));
}

#[tokio::test]
async fn otp_expires_and_resends_cool_down() {
    let db_pool = pool().await;
    let user = seed_user(&db_pool, "eve", "Eve").await;
    sqlx::query("UPDATE users SET is_verified=0 WHERE id=?").bind(user.id).execute(&db_pool).await.unwrap();

    let issued_at = now() - Duration::seconds(400);
    identity::issue_code(&db_pool, user.id, "111111", issued_at, 60).await.unwrap();
    assert!(matches!(
        identity::verify_code(&db_pool, &user.nus_email, "111111", now(), 300).await,
        Err(IdentityError::CodeExpired)
    ));

    identity::issue_code(&db_pool, user.id, "222222", now(), 60).await.unwrap();
    assert!(matches!(
        identity::issue_code(&db_pool, user.id, "333333", now(), 60).await,
        Err(IdentityError::Cooldown { .. })
    ));
    identity::issue_code(&db_pool, user.id, "444444", now() + Duration::seconds(61), 60).await.unwrap();
    let verified = identity::verify_code(&db_pool, &user.nus_email, "444444", now() + Duration::seconds(62), 300)
        .await
        .unwrap();
    assert!(verified.is_verified);
}

#[tokio::test]
async fn sign_in_requires_a_verified_account_and_the_right_password() {
    let db_pool = pool().await;
    let user = seed_user(&db_pool, "fay", "Fay").await;

    assert!(matches!(
        identity::authenticate(&db_pool, "fay@nus.edu", "wrong password").await,
        Err(IdentityError::InvalidPassword)
    ));
    assert_eq!(identity::authenticate(&db_pool, "FAY@nus.edu", PASSWORD).await.unwrap().id, user.id);

    sqlx::query("UPDATE users SET is_verified=0 WHERE id=?").bind(user.id).execute(&db_pool).await.unwrap();
    assert!(matches!(
        identity::authenticate(&db_pool, "fay@nus.edu", PASSWORD).await,
        Err(IdentityError::NotVerified)
    ));
}

#[tokio::test]
async fn registration_rejects_foreign_domains_and_duplicates() {
    let db_pool = pool().await;
    seed_user(&db_pool, "gus", "Gus").await;
    let new_user = |email: &str| identity::NewUser {
        nus_email: email.into(),
        password: PASSWORD.into(),
        name: String::new(),
        year: 1,
        major: String::new(),
    };

    assert!(matches!(
        identity::register(&db_pool, &settings(), new_user("gus@gmail.com"), now()).await,
        Err(IdentityError::InvalidEmail(_))
    ));
    assert!(matches!(
        identity::register(&db_pool, &settings(), new_user("GUS@nus.edu"), now()).await,
        Err(IdentityError::EmailTaken)
    ));
    let admin = identity::register(&db_pool, &settings(), new_user("admin@nus.edu"), now()).await.unwrap();
    assert!(admin.is_staff);
}

#[tokio::test]
async fn importing_twice_keeps_one_row_with_the_latest_title() {
    let db_pool = pool().await;
    let first = vec![
        json!({ "moduleCode": "CS1010", "title": "Programming Methodology" }),
        json!({ "title": "missing code" }),
    ];
    assert_eq!(catalog::import_catalog(&db_pool, &first).await.unwrap(), 1);

    let second = vec![json!({ "moduleCode": "CS1010", "title": "Programming Methodology I" })];
    assert_eq!(catalog::import_catalog(&db_pool, &second).await.unwrap(), 1);

    let page = catalog::search_modules(&db_pool, Some("cs1010"), 1).await.unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.results[0].title, "Programming Methodology I");
    assert_eq!(catalog::find_module(&db_pool, "cs1010").await.unwrap().module_code, "CS1010");
}

#[tokio::test]
async fn unenrolling_keeps_existing_connections() {
    let db_pool = pool().await;
    seed_module(&db_pool, "CS2030", "Programming Methodology II").await;
    let ann = seed_enrolled(&db_pool, "ann", "Ann", "CS2030", 0).await;
    let ben = seed_enrolled(&db_pool, "ben", "Ben", "CS2030", 0).await;

    let pending = connections::request(&db_pool, ann.id, ben.id, "CS2030", now()).await.unwrap();
    connections::respond(&db_pool, pending.id, ben.id, ConnectionStatus::Accepted).await.unwrap();
    enrolment::unenroll(&db_pool, ben.id, "CS2030").await.unwrap();

    let kept = connections::find_connection(&db_pool, pending.id).await.unwrap();
    assert_eq!(kept.status, ConnectionStatus::Accepted);
    let listed = connections::list_for_user(&db_pool, ann.id, &ConnectionFilters::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].counterpart.id, ben.id);
    assert!(connections::accepted_with(&db_pool, ann.id).await.unwrap().contains(&ben.id));
}

#[tokio::test]
async fn requester_can_withdraw_a_pending_request() {
    let db_pool = pool().await;
    seed_module(&db_pool, "CS2030", "Programming Methodology II").await;
    let ann = seed_enrolled(&db_pool, "ann", "Ann", "CS2030", 0).await;
    let ben = seed_enrolled(&db_pool, "ben", "Ben", "CS2030", 0).await;

    let pending = connections::request(&db_pool, ann.id, ben.id, "CS2030", now()).await.unwrap();
    let withdrawn = connections::respond(&db_pool, pending.id, ann.id, ConnectionStatus::Rejected).await.unwrap();
    assert!(withdrawn.is_none());
    assert!(connections::list_for_user(&db_pool, ben.id, &ConnectionFilters::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn outsiders_cannot_reject() {
    let db_pool = pool().await;
    seed_module(&db_pool, "CS2030", "Programming Methodology II").await;
    let ann = seed_enrolled(&db_pool, "ann", "Ann", "CS2030", 0).await;
    let ben = seed_enrolled(&db_pool, "ben", "Ben", "CS2030", 0).await;
    let cat = seed_enrolled(&db_pool, "cat", "Cat", "CS2030", 0).await;

    let pending = connections::request(&db_pool, ann.id, ben.id, "CS2030", now()).await.unwrap();
    assert!(matches!(
        connections::respond(&db_pool, pending.id, cat.id, ConnectionStatus::Rejected).await,
        Err(ConnectionError::NotParticipant(_))
    ));
    assert_eq!(
        connections::find_connection(&db_pool, pending.id).await.unwrap().status,
        ConnectionStatus::Pending
    );
}
