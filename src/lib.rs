mod auth;
mod config;
mod database;
mod db;
mod driver;
mod error;
mod middleware;
mod models;
mod routes;
mod service;

#[cfg(test)]
pub mod test_utils;

pub use config::Config;

use crate::db::stage_db;
use crate::driver::ProviderDriverFactory;
use crate::middleware::RequestLogger;
use crate::middleware::rate_limit::RateLimiter;
use crate::routes as app_routes;
use crate::service::cache::ViewCache;
use crate::service::email::EmailService;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, http::Method};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};
use rocket_okapi::{get_openapi_route, okapi::merge::marge_spec_list};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_tracing(log_level: &str, json_format: bool) {
    // RUST_LOG overrides the configured level, e.g. RUST_LOG=info,mailroom::driver=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true);

    // A subscriber may already be installed when several rockets are built in one process.
    let _ = if json_format {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
}

fn ensure_rocket_secret_key() {
    let profile = std::env::var("ROCKET_PROFILE").unwrap_or_else(|_| "debug".to_string());

    // Private session cookies cannot be read across restarts without a fixed key.
    if profile != "debug" && std::env::var("ROCKET_SECRET_KEY").is_err() {
        panic!(
            "ROCKET_SECRET_KEY is required for profile '{}'. Generate one with: openssl rand -base64 32",
            profile
        );
    }
}

fn build_cors(cors_config: &config::CorsConfig) -> CorsOptions {
    let is_wildcard = cors_config.allowed_origins.len() == 1 && cors_config.allowed_origins[0] == "*";

    if is_wildcard && cors_config.allow_credentials {
        panic!(
            "Invalid CORS configuration: Cannot use wildcard origins (*) with credentials enabled. \
            Either set specific origins or disable credentials."
        );
    }

    let allowed_origins = if cors_config.allowed_origins.is_empty() {
        AllowedOrigins::some_exact::<&str>(&[])
    } else if is_wildcard {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(&cors_config.allowed_origins.iter().map(String::as_str).collect::<Vec<_>>())
    };

    CorsOptions {
        allowed_origins,
        allowed_methods: vec![Method::Get, Method::Post, Method::Put, Method::Delete, Method::Options, Method::Head]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: rocket_cors::AllowedHeaders::some(&["Content-Type", "Accept"]),
        allow_credentials: cors_config.allow_credentials,
        ..Default::default()
    }
}

fn get_swagger_config(openapi_url: &str) -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: openapi_url.to_string(),
        ..Default::default()
    }
}

fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return config::DEFAULT_API_BASE_PATH.to_string();
    }

    let mut normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };

    while normalized.ends_with('/') && normalized.len() > 1 {
        normalized.pop();
    }

    normalized
}

fn join_base_path(base_path: &str, path: &str) -> String {
    let base = base_path.trim_end_matches('/');
    let suffix = path.trim_start_matches('/');

    if base.is_empty() {
        format!("/{}", suffix)
    } else {
        format!("{}/{}", base, suffix)
    }
}

fn collect_base_paths(api_config: &config::ApiConfig) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for raw in std::iter::once(&api_config.base_path).chain(&api_config.additional_base_paths) {
        let path = normalize_base_path(raw);
        if !normalized.contains(&path) {
            normalized.push(path);
        }
    }
    normalized
}

struct RouteSpec {
    path: &'static str,
    routes: Vec<rocket::Route>,
    openapi: rocket_okapi::okapi::openapi3::OpenApi,
}

fn collect_route_specs() -> Vec<RouteSpec> {
    let (mail_routes, mail_openapi) = app_routes::mail::routes();
    let (connection_routes, connection_openapi) = app_routes::connection::routes();
    let (settings_routes, settings_openapi) = app_routes::settings::routes();
    let (early_access_routes, early_access_openapi) = app_routes::early_access::routes();
    let (health_routes, health_openapi) = app_routes::health::routes();

    vec![
        RouteSpec {
            path: "/mail",
            routes: mail_routes,
            openapi: mail_openapi,
        },
        RouteSpec {
            path: "/connections",
            routes: connection_routes,
            openapi: connection_openapi,
        },
        RouteSpec {
            path: "/settings",
            routes: settings_routes,
            openapi: settings_openapi,
        },
        RouteSpec {
            path: "/early-access",
            routes: early_access_routes,
            openapi: early_access_openapi,
        },
        RouteSpec {
            path: "/health",
            routes: health_routes,
            openapi: health_openapi,
        },
    ]
}

fn mount_api_routes(mut rocket: Rocket<Build>, base_path: &str, enable_swagger: bool) -> Rocket<Build> {
    let route_specs = collect_route_specs();

    if !enable_swagger {
        for spec in route_specs {
            rocket = rocket.mount(join_base_path(base_path, spec.path), spec.routes);
        }
        return rocket.register(base_path, app_routes::error::catchers());
    }

    let mut openapi_list = Vec::new();
    for spec in route_specs {
        rocket = rocket.mount(join_base_path(base_path, spec.path), spec.routes);
        openapi_list.push((spec.path, spec.openapi));
    }

    let openapi_docs = match marge_spec_list(&openapi_list) {
        Ok(docs) => docs,
        Err(err) => panic!("Could not merge OpenAPI spec: {}", err),
    };

    let settings = rocket_okapi::settings::OpenApiSettings::default();
    let docs_path = join_base_path(base_path, "docs");
    let openapi_url = join_base_path(base_path, "openapi.json");
    rocket
        .mount(base_path, vec![get_openapi_route(openapi_docs, &settings)])
        .mount(docs_path, make_swagger_ui(&get_swagger_config(&openapi_url)))
        .register(base_path, app_routes::error::catchers())
}

fn stage_rate_limiter(rate_limit_config: config::RateLimitConfig) -> AdHoc {
    AdHoc::on_ignite("Rate Limiter", move |rocket| {
        let limiter = Arc::new(RateLimiter::new(rate_limit_config.clone()));
        limiter.clone().spawn_cleanup_task();

        Box::pin(async move { rocket.manage(limiter) })
    })
}

/// Shared services every request borrows: provider drivers, the view cache and the mailer.
fn stage_services(config: &Config) -> AdHoc {
    let drivers = ProviderDriverFactory::new(config.providers.google.clone());
    let cache = Arc::new(ViewCache::new(config.cache.ttl_seconds).with_max_entries(config.cache.max_entries));
    let cleanup_every = Duration::from_secs(config.cache.cleanup_interval_seconds);
    let email = EmailService::new(config.email.clone());
    let session = config.session.clone();

    AdHoc::on_ignite("Mail Services", move |rocket| {
        cache.clone().spawn_cleanup_task(cleanup_every);

        Box::pin(async move { rocket.manage(drivers).manage(cache).manage(email).manage(session) })
    })
}

pub fn build_rocket(config: Config) -> Rocket<Build> {
    init_tracing(&config.logging.level, config.logging.json_format);
    ensure_rocket_secret_key();

    let cors = match build_cors(&config.cors).to_cors() {
        Ok(cors) => cors,
        Err(err) => panic!("Failed to create CORS fairing: {}", err),
    };

    let figment = rocket::Config::figment()
        .merge(("port", config.server.port))
        .merge(("address", config.server.address.clone()));

    let mut rocket = rocket::custom(figment)
        .attach(stage_rate_limiter(config.rate_limit.clone()))
        .attach(stage_services(&config))
        .attach(cors)
        .attach(RequestLogger)
        .attach(stage_db(config.database.clone()));

    for base_path in collect_base_paths(&config.api) {
        rocket = mount_api_routes(rocket, &base_path, config.api.enable_swagger);
    }

    rocket
}
