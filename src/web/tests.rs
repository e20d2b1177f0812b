//! Router tests: full requests against an in-memory database

use super::*;
use crate::cache::create_cache;
use crate::config::CacheConfig;
use crate::db::{create_test_pool, migrations};
use crate::services::media::tests::PNG_BYTES;
use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use tempfile::TempDir;

const PASSWORD: &str = "Chaton-Volant-42";

struct TestApp {
    state: AppState,
    _media: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_template_overrides(None).await
    }

    async fn with_template_overrides(dir: Option<&std::path::Path>) -> Self {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let media = TempDir::new().unwrap();
        let mut config = Config::default();
        config.media.path = media.path().to_path_buf();

        let cache = create_cache(&CacheConfig::default());
        let templates = TemplateEngine::new(dir).unwrap();

        Self {
            state: AppState::new(config, pool, cache, templates),
            _media: media,
        }
    }

    /// A client with its own cookie jar
    fn client(&self) -> TestServer {
        let mut server = TestServer::new(build_router(self.state.clone())).unwrap();
        server.save_cookies();
        server
    }

    async fn register(&self, username: &str) {
        let email = format!("{}@example.com", username);
        let response = self
            .client()
            .post("/members/register/")
            .form(&[
                ("username", username),
                ("first_name", ""),
                ("last_name", ""),
                ("email", email.as_str()),
                ("password1", PASSWORD),
                ("password2", PASSWORD),
            ])
            .await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    }

    /// Register `username` and return a client logged in as them
    async fn member(&self, username: &str) -> TestServer {
        self.register(username).await;
        let client = self.client();
        let response = client
            .post("/members/login/")
            .form(&[("username", username), ("password", PASSWORD)])
            .await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        client
    }
}

fn post_form(title: &str, category_id: Option<i64>) -> MultipartForm {
    let mut form = MultipartForm::new()
        .add_text("title", title)
        .add_text("overview", "Un résumé")
        .add_text("content", "Du **contenu**")
        .add_text("status", "1")
        .add_part(
            "thumbnail",
            Part::bytes(PNG_BYTES.to_vec())
                .file_name("vignette.png")
                .mime_type("image/png"),
        );
    if let Some(id) = category_id {
        form = form.add_text("categories", id.to_string());
    }
    form
}

// ============================================================================
// Pages
// ============================================================================

#[tokio::test]
async fn test_static_pages() {
    let app = TestApp::new().await;
    let client = app.client();

    let home = client.get("/").await;
    assert_eq!(home.status_code(), StatusCode::OK);
    assert!(home.text().contains("<title>Accueil :: Mutadi</title>"));

    assert!(client.get("/tos/").await.text().contains("Mentions légales"));
    assert!(client.get("/how/").await.text().contains("Comment ça marche ?"));
}

#[tokio::test]
async fn test_broken_template_is_a_server_error() {
    let overrides = TempDir::new().unwrap();
    std::fs::create_dir_all(overrides.path().join("pages")).unwrap();
    std::fs::write(
        overrides.path().join("pages/tos.html"),
        r#"{% extends "base.html" %}{% block content %}{{ missing.field }}{% endblock content %}"#,
    )
    .unwrap();
    let app = TestApp::with_template_overrides(Some(overrides.path())).await;

    let response = app.client().get("/tos/").await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().contains("Erreur 500"));

    assert_eq!(app.client().get("/how/").await.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_pages_are_404() {
    let app = TestApp::new().await;
    let client = app.client();

    for path in ["/nowhere/", "/posts/post_detail/999", "/posts/post_detail/abc", "/members/42/profile/"] {
        let response = client.get(path).await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND, "{}", path);
        assert!(response.text().contains("Erreur 404"), "{}", path);
    }
}

// ============================================================================
// Members
// ============================================================================

#[tokio::test]
async fn test_login_required_redirects_with_next() {
    let app = TestApp::new().await;
    let response = app.client().get("/messages/inbox/").await;

    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.header("location"),
        "/members/login/?next=%2Fmessages%2Finbox%2F"
    );
}

#[tokio::test]
async fn test_register_flashes_once_then_login() {
    let app = TestApp::new().await;
    let client = app.client();

    let response = client
        .post("/members/register/")
        .form(&[
            ("username", "alice"),
            ("first_name", "Alice"),
            ("last_name", "Martin"),
            ("email", "alice@example.com"),
            ("password1", PASSWORD),
            ("password2", PASSWORD),
        ])
        .await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/members/login/");

    let login_page = client.get("/members/login/").await;
    assert!(login_page
        .text()
        .contains("Le compte de alice a été créé avec succès !"));

    // Shown once only
    let again = client.get("/members/login/").await;
    assert!(!again.text().contains("Le compte de alice"));

    let response = client
        .post("/members/login/")
        .form(&[
            ("username", "alice"),
            ("password", PASSWORD),
            ("next", "/messages/inbox/"),
        ])
        .await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/messages/inbox/");

    let inbox = client.get("/messages/inbox/").await;
    assert_eq!(inbox.status_code(), StatusCode::OK);
    assert!(inbox.text().contains("Mes messages reçus"));
}

#[tokio::test]
async fn test_register_errors_rerender_form() {
    let app = TestApp::new().await;
    let response = app
        .client()
        .post("/members/register/")
        .form(&[
            ("username", "alice"),
            ("email", "alice@example.com"),
            ("password1", PASSWORD),
            ("password2", "autre-chose-123"),
        ])
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let html = response.text();
    assert!(html.contains("Les deux mots de passe ne correspondent pas."));
    assert!(html.contains(r#"value="alice""#));
    assert!(!html.contains(PASSWORD));
}

#[tokio::test]
async fn test_bad_login_stays_on_form() {
    let app = TestApp::new().await;
    app.register("alice").await;

    let response = app
        .client()
        .post("/members/login/")
        .form(&[("username", "alice"), ("password", "mauvais-mot-de-passe")])
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("Saisissez un nom d"));
}

#[tokio::test]
async fn test_offsite_next_is_ignored() {
    let app = TestApp::new().await;
    app.register("alice").await;

    let response = app
        .client()
        .post("/members/login/?next=https://evil.example/")
        .form(&[("username", "alice"), ("password", PASSWORD)])
        .await;
    assert_eq!(response.header("location"), "/");
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = TestApp::new().await;
    let alice = app.member("alice").await;
    assert_eq!(alice.get("/messages/inbox/").await.status_code(), StatusCode::OK);

    let response = alice.post("/members/logout/").await;
    assert_eq!(response.header("location"), "/");
    assert_eq!(
        alice.get("/messages/inbox/").await.status_code(),
        StatusCode::SEE_OTHER
    );
}

#[tokio::test]
async fn test_change_password_page_title() {
    let app = TestApp::new().await;
    let alice = app.member("alice").await;

    let page = alice.get("/members/password/").await;
    assert!(page.text().contains("<title>Changer de mot de passe :: Mutadi</title>"));

    let response = alice
        .post("/members/password/")
        .form(&[
            ("old_password", PASSWORD),
            ("new_password1", "Tortue-Rapide-77"),
            ("new_password2", "Tortue-Rapide-77"),
        ])
        .await;
    assert_eq!(response.header("location"), "/members/change_password_success/");

    // The new session cookie keeps the member logged in
    assert_eq!(alice.get("/messages/inbox/").await.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_profile_pages() {
    let app = TestApp::new().await;
    let alice = app.member("alice").await;
    let bob = app.member("bob").await;

    let profile = app.client().get("/members/1/profile/").await;
    assert_eq!(profile.status_code(), StatusCode::OK);
    assert!(profile.text().contains("Mon profil"));
    assert!(profile.text().contains("Plaisir d&#x27;aider ou de se faire aider !!"));

    assert_eq!(
        bob.get("/members/1/edit_user_profile/").await.status_code(),
        StatusCode::FORBIDDEN
    );

    let response = alice
        .post("/members/1/edit_user_profile/")
        .multipart(MultipartForm::new().add_text("bio", "Jardinière du dimanche"))
        .await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert!(app
        .client()
        .get("/members/1/profile/")
        .await
        .text()
        .contains("Jardinière du dimanche"));
}

// ============================================================================
// Posts
// ============================================================================

#[tokio::test]
async fn test_post_lifecycle() {
    let app = TestApp::new().await;
    // First account is the admin
    let alice = app.member("alice").await;
    let bob = app.member("bob").await;

    let response = alice
        .post("/posts/categories/")
        .form(&[("title", "Jardin")])
        .await;
    assert_eq!(response.header("location"), "/posts/categories/");

    let response = alice
        .post("/posts/add_post/")
        .multipart(post_form("Tailler les rosiers", Some(1)))
        .await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "/");

    let home = alice.get("/").await.text();
    assert!(home.contains("La publication a été créée avec succès !"));
    assert!(home.contains("Tailler les rosiers"));

    let by_category = app.client().get("/posts/category/Jardin/").await.text();
    assert!(by_category.contains("Tailler les rosiers"));

    let search = app.client().get("/posts/search/?q=ROSIERS").await.text();
    assert!(search.contains("Tailler les rosiers"));

    // Only the author (or an admin) may edit
    assert_eq!(
        bob.get("/posts/post_detail/edit/1").await.status_code(),
        StatusCode::FORBIDDEN
    );

    let response = bob
        .post("/posts/post_detail/1")
        .form(&[("content", "Merci pour l'astuce")])
        .await;
    assert_eq!(response.header("location"), "/posts/post_detail/1");

    let detail = app.client().get("/posts/post_detail/1").await.text();
    assert!(detail.contains("Merci pour l&#x27;astuce"));
    assert!(detail.contains("1 commentaire"));

    let response = alice.post("/posts/post_detail/1/remove").await;
    assert_eq!(response.header("location"), "/");
    assert_eq!(
        app.client().get("/posts/post_detail/1").await.status_code(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_renamed_author_shows_on_cached_home() {
    let app = TestApp::new().await;
    let alice = app.member("alice").await;
    let response = alice
        .post("/posts/add_post/")
        .multipart(post_form("Semis de printemps", None))
        .await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);

    assert!(app.client().get("/").await.text().contains(">alice</a>"));

    let response = alice
        .post("/members/edit_user_settings/")
        .form(&[
            ("username", "alicia"),
            ("first_name", ""),
            ("last_name", ""),
            ("email", "alice@example.com"),
        ])
        .await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);

    let home = app.client().get("/").await.text();
    assert!(home.contains(">alicia</a>"));
    assert!(!home.contains(">alice</a>"));
}

#[tokio::test]
async fn test_add_post_without_thumbnail_rerenders() {
    let app = TestApp::new().await;
    let alice = app.member("alice").await;

    let form = MultipartForm::new()
        .add_text("title", "Sans image")
        .add_text("overview", "Un résumé")
        .add_text("content", "Du contenu");
    let response = alice.post("/posts/add_post/").multipart(form).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let html = response.text();
    assert!(html.contains("Ce champ est obligatoire."));
    assert!(html.contains(r#"value="Sans image""#));
}

#[tokio::test]
async fn test_anonymous_comment_goes_to_login() {
    let app = TestApp::new().await;
    let response = app
        .client()
        .post("/posts/post_detail/1")
        .form(&[("content", "Bonjour")])
        .await;

    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.header("location"),
        "/members/login/?next=%2Fposts%2Fpost_detail%2F1"
    );
}

#[tokio::test]
async fn test_categories_are_admin_only() {
    let app = TestApp::new().await;
    let alice = app.member("alice").await;
    let bob = app.member("bob").await;

    assert_eq!(alice.get("/posts/categories/").await.status_code(), StatusCode::OK);
    assert_eq!(bob.get("/posts/categories/").await.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(
        bob.post("/posts/categories/")
            .form(&[("title", "Cuisine")])
            .await
            .status_code(),
        StatusCode::FORBIDDEN
    );
}

// ============================================================================
// Private messages
// ============================================================================

#[tokio::test]
async fn test_message_flow() {
    let app = TestApp::new().await;
    let alice = app.member("alice").await;
    let bob = app.member("bob").await;
    let carol = app.member("carol").await;

    let compose = alice.get("/messages/compose_message/").await.text();
    assert!(compose.contains(">bob</option>"));
    assert!(!compose.contains(">alice</option>"));

    let response = alice
        .post("/messages/compose_message/")
        .form(&[("subject", "Bonjour"), ("recipient", "2"), ("content", "Salut Bob")])
        .await;
    assert_eq!(response.header("location"), "/messages/inbox/");

    let outbox = alice.get("/messages/outbox/").await.text();
    assert!(outbox.contains("Mes messages envoyés"));
    assert!(outbox.contains("Bonjour"));

    let inbox = bob.get("/messages/inbox/").await.text();
    assert!(inbox.contains("Bonjour"));

    let detail = bob.get("/messages/message_detail/1").await.text();
    assert!(detail.contains(r#"value="Re: Bonjour""#));

    // Strangers cannot see it
    assert_eq!(
        carol.get("/messages/message_detail/1").await.status_code(),
        StatusCode::NOT_FOUND
    );

    let response = bob
        .post("/messages/message_detail/1")
        .form(&[("subject", "Re: Bonjour"), ("content", "Salut Alice")])
        .await;
    assert_eq!(response.header("location"), "/messages/inbox/");
    assert!(alice.get("/messages/inbox/").await.text().contains("Re: Bonjour"));
}

#[tokio::test]
async fn test_message_delete_is_per_party() {
    let app = TestApp::new().await;
    let alice = app.member("alice").await;
    let bob = app.member("bob").await;

    alice
        .post("/messages/compose_message/")
        .form(&[("subject", "Rendez-vous"), ("recipient", "2"), ("content", "Demain ?")])
        .await;

    let response = bob.post("/messages/message_detail/1/delete").await;
    assert_eq!(response.header("location"), "/messages/inbox/");

    assert!(!bob.get("/messages/inbox/").await.text().contains("Rendez-vous"));
    assert_eq!(
        bob.get("/messages/message_detail/1").await.status_code(),
        StatusCode::NOT_FOUND
    );

    // Still in the sender's outbox
    assert!(alice.get("/messages/outbox/").await.text().contains("Rendez-vous"));
    assert_eq!(
        alice.get("/messages/message_detail/1").await.status_code(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_compose_to_unknown_recipient() {
    let app = TestApp::new().await;
    let alice = app.member("alice").await;

    let response = alice
        .post("/messages/compose_message/")
        .form(&[("subject", "Bonjour"), ("recipient", "99"), ("content", "Salut")])
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("Sélectionnez un choix valide."));
}
