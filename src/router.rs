//! Routes and middleware of the JSON API.

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Read-only public data, so any origin may call it.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index))
        .route("/api/generators", get(handlers::api_generators))
        .route(
            "/api/generators/bounds",
            get(handlers::api_generators_in_bounds),
        )
        .route(
            "/api/generators/export",
            get(handlers::api_generators_export),
        )
        .route("/api/generation", get(handlers::api_generation))
        .route(
            "/api/generation/realtime",
            get(handlers::api_realtime_generation),
        )
        .route("/api/capacity/by-state", get(handlers::api_capacity_by_state))
        .route("/api/capacity/summary", get(handlers::api_capacity_summary))
        .route(
            "/api/capacity/by-technology",
            get(handlers::api_capacity_by_technology),
        )
        .route(
            "/api/analytics/polygon",
            get(handlers::api_polygon_analytics),
        )
        .route(
            "/api/balancing-authorities",
            get(handlers::api_balancing_authorities),
        )
        .route("/api/fuel-types", get(handlers::api_fuel_types))
        .route("/api/metadata", get(handlers::api_route_metadata))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::EiaClient;
    use crate::config::Config;
    use crate::renewables::{CAPACITY_ROUTE, FUEL_TYPE_ROUTE};
    use crate::transport::testing::{DatasetTransport, ScriptedTransport};
    use crate::transport::Transport;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(transport: Arc<dyn Transport>) -> Router {
        let mut config = Config::new("test-key");
        config.base_url = "https://eia.test/v2".into();
        let client = EiaClient::new(config, transport);
        create_router(Arc::new(AppState::new(client)))
    }

    fn fleet() -> DatasetTransport {
        let records = vec![
            json!({
                "plantid": 1, "generatorid": "PV1", "plantName": "Mesa Solar",
                "stateid": "TX", "technology": "Solar Photovoltaic",
                "energy_source_code": "SUN", "status": "OP",
                "nameplate-capacity-mw": "120", "latitude": "31.5", "longitude": "-99.5",
            }),
            json!({
                "plantid": 2, "generatorid": "W1", "plantName": "Ridge Wind",
                "stateid": "TX", "technology": "Onshore Wind Turbine",
                "energy_source_code": "WND", "status": "OP",
                "nameplate-capacity-mw": "200", "latitude": "33.0", "longitude": "-101.0",
            }),
            json!({
                "plantid": 3, "generatorid": "PV1", "plantName": "Valley Solar",
                "stateid": "CA", "technology": "Solar Photovoltaic",
                "energy_source_code": "SUN", "status": "OP",
                "nameplate-capacity-mw": "80", "latitude": "35.0", "longitude": "-118.0",
            }),
        ];
        DatasetTransport::new()
            .route(CAPACITY_ROUTE, records)
            .route(FUEL_TYPE_ROUTE, Vec::new())
            .filter_on("stateid")
            .filter_on("energy_source_code")
    }

    async fn call(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_router_creation() {
        let _router = app(Arc::new(ScriptedTransport::new()));
    }

    #[tokio::test]
    async fn test_index() {
        let response = call(app(Arc::new(ScriptedTransport::new())), "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_generators_filtered_by_state() {
        let response = call(app(Arc::new(fleet())), "/api/generators?states=tx&sources=").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|g| g["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["1-PV1", "2-W1"]);
        assert_eq!(body[0]["capacity_mw"], 120.0);
        assert_eq!(body[0]["lat"], 31.5);
    }

    #[tokio::test]
    async fn test_unknown_source_is_bad_request() {
        let response = call(app(Arc::new(fleet())), "/api/generators?sources=COAL").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_bounds() {
        let uri = "/api/generators/bounds?min_lat=30&max_lat=34&min_lon=-102&max_lon=-98";
        let body = json_body(call(app(Arc::new(fleet())), uri).await).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_polygon_analytics() {
        let uri = "/api/analytics/polygon?coordinates=%5B%5B30%2C-103%5D%2C%5B34%2C-103%5D%2C%5B34%2C-98%5D%2C%5B30%2C-98%5D%5D";
        let response = call(app(Arc::new(fleet())), uri).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["total_generators"], 2);
        assert_eq!(body["solar_capacity_mw"], 120.0);
        assert_eq!(body["wind_capacity_mw"], 200.0);
        assert_eq!(body["states"], json!(["TX"]));
    }

    #[tokio::test]
    async fn test_polygon_with_two_vertices_is_rejected() {
        let uri = "/api/analytics/polygon?coordinates=%5B%5B30%2C-100%5D%2C%5B40%2C-100%5D%5D";
        let response = call(app(Arc::new(fleet())), uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "INVALID_GEOMETRY");
    }

    #[tokio::test]
    async fn test_polygon_without_coordinates_is_rejected() {
        let response = call(app(Arc::new(fleet())), "/api/analytics/polygon").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_csv_export() {
        let response = call(
            app(Arc::new(fleet())),
            "/api/generators/export?format=csv&states=CA",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let csv = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(csv.starts_with("id,name,state"));
        assert!(csv.contains("Valley Solar"));
        assert_eq!(csv.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_export_format() {
        let response = call(app(Arc::new(fleet())), "/api/generators/export?format=xml").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_capacity_by_technology() {
        let body = json_body(call(app(Arc::new(fleet())), "/api/capacity/by-technology").await).await;
        assert_eq!(body[0]["technology"], "Onshore Wind Turbine");
        assert_eq!(body[1]["technology"], "Solar Photovoltaic");
        assert_eq!(body[1]["capacity_mw"], 200.0);
        assert_eq!(body[1]["count"], 2);
    }

    #[tokio::test]
    async fn test_capacity_summary() {
        let body =
            json_body(call(app(Arc::new(fleet())), "/api/capacity/summary?states=TX").await).await;
        assert_eq!(body["TX"]["total"], 320.0);
        assert!(body.get("CA").is_none());
    }

    #[tokio::test]
    async fn test_upstream_auth_failure_is_server_error() {
        let transport = ScriptedTransport::new()
            .respond(401, json!({}))
            .respond(401, json!({}));
        let response = call(
            app(Arc::new(transport)),
            "/api/capacity/by-state?states=CA,TX",
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["code"], "UPSTREAM_AUTH_FAILED");
    }

    #[tokio::test]
    async fn test_zero_limit_is_bad_request() {
        for uri in [
            "/api/generators?limit=0",
            "/api/capacity/summary?limit=0",
            "/api/generators/bounds?min_lat=30&max_lat=34&min_lon=-102&max_lon=-98&limit=0",
            "/api/generation?limit=0",
        ] {
            let response = call(app(Arc::new(fleet())), uri).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_generation_series() {
        let transport = Arc::new(
            DatasetTransport::new()
                .route(
                    FUEL_TYPE_ROUTE,
                    vec![
                        json!({ "period": "2024-06-02", "respondent": "CISO", "fueltype": "SUN", "value": 20 }),
                        json!({ "period": "2024-06-01", "respondent": "CISO", "fueltype": "SUN", "value": 10 }),
                        json!({ "period": "2024-05-31", "respondent": "CISO", "fueltype": "SUN", "value": 5 }),
                    ],
                )
                .filter_on("respondent")
                .filter_on("fueltype"),
        );
        let uri = "/api/generation?frequency=daily&start=2024-06-01&end=2024-06-30&regions=ciso&sources=SUN";
        let response = call(app(transport.clone()), uri).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["period"], "2024-06-02");
        assert_eq!(body[0]["value"], 20.0);

        let request = &transport.requests()[0];
        assert_eq!(request.param("frequency"), Some("daily"));
        assert_eq!(request.param("start"), Some("2024-06-01"));
        assert_eq!(request.param("end"), Some("2024-06-30"));
        assert_eq!(request.params("facets[respondent][]"), vec!["CISO"]);
    }

    #[tokio::test]
    async fn test_generation_unknown_frequency() {
        let response = call(app(Arc::new(fleet())), "/api/generation?frequency=weekly").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_route_metadata() {
        let transport = Arc::new(ScriptedTransport::new().respond(
            200,
            json!({ "response": { "id": "rto", "frequency": [{ "id": "hourly" }] } }),
        ));
        let response = call(app(transport.clone()), "/api/metadata?route=electricity/rto").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["response"]["id"], "rto");
        assert_eq!(transport.requests()[0].url, "https://eia.test/v2/electricity/rto");

        let response = call(app(transport), "/api/metadata?route=electricity/../admin").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_realtime_without_data_reports_zero() {
        let body = json_body(
            call(app(Arc::new(fleet())), "/api/generation/realtime?regions=CISO").await,
        )
        .await;
        assert_eq!(body[0]["region"], "CISO");
        assert_eq!(body[0]["region_name"], "CISO");
        assert_eq!(body[0]["total_mwh"], 0.0);
    }
}
