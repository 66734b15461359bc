mod common;

use std::sync::atomic::Ordering;

use axum::http::StatusCode;
use serde_json::json;
use team_portal::session::{Role, SessionState, SessionStore};

use common::{principal, settle, TestPortal, PASSWORD};

#[tokio::test]
async fn login_lands_on_dashboard_by_default() {
    let portal = TestPortal::start();
    portal.state.manager.restore().await;
    assert_eq!(portal.state.sessions.current(), SessionState::Unauthenticated);

    let coach = principal(Some(Role::Tecnico));
    let res = portal.login("coach@club.test", &coach).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["redirect_to"], "/dashboard");
    assert_eq!(res.body["data"]["principal"]["role"], "tecnico");
    assert_eq!(portal.state.sessions.current(), SessionState::Authenticated(coach));
}

#[tokio::test]
async fn login_honours_preserved_path_but_not_foreign_urls() {
    let portal = TestPortal::start();
    portal.state.sessions.settle(None);
    let coach = principal(Some(Role::Tecnico));
    portal.auth.register("coach@club.test", &coach);

    let res = portal
        .post(
            "/auth/login",
            json!({ "email": "coach@club.test", "password": PASSWORD, "redirect": "/rankings?season=2024" }),
        )
        .await;
    assert_eq!(res.body["data"]["redirect_to"], "/rankings?season=2024");

    let res = portal
        .post(
            "/auth/login",
            json!({ "email": "coach@club.test", "password": PASSWORD, "redirect": "https://evil.example/" }),
        )
        .await;
    assert_eq!(res.body["data"]["redirect_to"], "/dashboard");
}

#[tokio::test]
async fn bad_credentials_are_rejected_without_touching_session() {
    let portal = TestPortal::start();
    portal.state.sessions.settle(None);

    let res = portal
        .post("/auth/login", json!({ "email": "nobody@club.test", "password": "wrong" }))
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(portal.state.sessions.current(), SessionState::Unauthenticated);

    let res = portal.post("/auth/login", json!({ "email": " ", "password": "" })).await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_page_bounces_signed_in_sessions() {
    let portal = TestPortal::start();
    portal.state.sessions.settle(Some(principal(Some(Role::Monitor))));

    let res = portal.get("/login").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), Some("/dashboard"));
}

#[tokio::test]
async fn visited_route_is_restored_after_reload() {
    let portal = TestPortal::start();
    portal.state.sessions.settle(None);
    let monitor = principal(Some(Role::Monitor));
    portal.login("monitor@club.test", &monitor).await;

    let res = portal.get("/attendance").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(portal.state.routes.restore_for(&monitor).as_deref(), Some("/attendance"));

    // Reload: the check goes through unsettled and resolves from the stored token
    portal.state.manager.restore().await;
    settle().await;
    assert_eq!(portal.state.sessions.current(), SessionState::Authenticated(monitor.clone()));
    assert_eq!(portal.state.routes.restore_for(&monitor).as_deref(), Some("/attendance"));

    let res = portal.get("/api/session").await;
    assert_eq!(res.body["data"]["restore_route"], "/attendance");
}

#[tokio::test]
async fn logout_clears_persisted_route_and_token() {
    let portal = TestPortal::start();
    portal.state.sessions.settle(None);
    let coach = principal(Some(Role::Tecnico));
    portal.login("coach@club.test", &coach).await;

    portal.get("/meetings").await;
    assert!(portal.state.routes.persisted_route().is_some());

    let res = portal.post("/auth/logout", json!({})).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["redirect_to"], "/login");
    settle().await;

    assert_eq!(portal.state.sessions.current(), SessionState::Unauthenticated);
    assert!(portal.state.routes.persisted_route().is_none());
    assert!(portal.state.manager.access_token().is_none());
    assert_eq!(portal.auth.sign_outs.load(Ordering::SeqCst), 1);

    // Signing back in starts from the dashboard, not the previous route
    let res = portal.login("coach@club.test", &coach).await;
    assert_eq!(res.body["data"]["redirect_to"], "/dashboard");
}

#[tokio::test]
async fn persisted_route_is_not_restored_for_another_principal() {
    let portal = TestPortal::start();
    portal.state.sessions.settle(None);

    let coach = principal(Some(Role::Tecnico));
    portal.login("coach@club.test", &coach).await;
    portal.get("/settings").await;

    // Switching accounts without an explicit logout
    let monitor = principal(Some(Role::Monitor));
    let res = portal.login("monitor@club.test", &monitor).await;
    assert_eq!(res.body["data"]["redirect_to"], "/dashboard");

    portal.get("/athletes").await;
    settle().await;

    assert_eq!(portal.state.routes.restore_for(&monitor).as_deref(), Some("/athletes"));
    assert_eq!(portal.state.routes.restore_for(&coach), None);
}

#[tokio::test]
async fn route_visited_after_relogin_is_kept() {
    let portal = TestPortal::start();
    portal.state.sessions.settle(None);
    let coach = principal(Some(Role::Tecnico));

    portal.login("coach@club.test", &coach).await;
    portal.get("/settings").await;
    portal.post("/auth/logout", json!({})).await;

    portal.login("coach@club.test", &coach).await;
    portal.get("/rankings").await;
    settle().await;

    assert_eq!(portal.state.routes.restore_for(&coach).as_deref(), Some("/rankings"));
    let res = portal.get("/api/session").await;
    assert_eq!(res.body["data"]["restore_route"], "/rankings");
}

#[tokio::test]
async fn denied_navigation_is_not_recorded() {
    let portal = TestPortal::start();
    let monitor = principal(Some(Role::Monitor));
    portal.state.sessions.settle(Some(monitor.clone()));

    portal.get("/athletes").await;
    portal.get("/meetings").await;

    assert_eq!(portal.state.routes.restore_for(&monitor).as_deref(), Some("/athletes"));
}
