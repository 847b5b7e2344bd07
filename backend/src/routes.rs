use actix_web::error::JsonPayloadError;
use actix_web::http::StatusCode;
use actix_web::{web, Error, HttpRequest, HttpResponse, ResponseError};
use log::error;
use serde::Serialize;
use serde_json::json;
use shared::TaskSubmission;

use crate::db::StoreAccessor;
use crate::mq::PublishError;
use crate::tasks::TaskService;

#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

/// Failures that are the server's fault rather than the task's.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Failed to record task result: {0}")]
    Publish(#[from] PublishError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Publish(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            message: self.to_string(),
        })
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .service(web::resource(["/health", "/health/"]).route(web::get().to(health_check)))
        .service(web::resource(["/image", "/image/"]).route(web::post().to(create_image_task)));
}

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse {
        message: err.to_string(),
    });
    actix_web::error::InternalError::from_response(err, response).into()
}

async fn health_check(store: Option<web::Data<StoreAccessor>>) -> HttpResponse {
    let mut body = json!({ "status": "ok" });
    if let Some(store) = store {
        body["database"] = json!(store.state());
        body["connections"] = json!(store.active_connections());
    }
    HttpResponse::Ok().json(body)
}

async fn create_image_task(
    tasks: web::Data<TaskService>,
    submission: web::Json<TaskSubmission>,
) -> Result<HttpResponse, ApiError> {
    let task_id = submission.task_id;
    let result = tasks.submit(submission.into_inner()).await.map_err(|e| {
        error!("Task {} finished without a recorded result: {}", task_id, e);
        ApiError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::fetch::ImageFetcher;
    use crate::mq::ResultPublisher;
    use crate::operations::OperationContext;
    use crate::storage::ImageStorage;
    use crate::test_support::{RecordingPublisher, UnreachablePublisher};
    use actix_web::{test, App};
    use serde_json::Value;
    use shared::TaskResult;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn task_service(publisher: Arc<dyn ResultPublisher>) -> TaskService {
        TaskService::new(
            ImageFetcher::new(Duration::from_secs(5)),
            OperationContext::new(ImageStorage::new(std::env::temp_dir()), (300, 300)),
            publisher,
        )
    }

    #[actix_web::test]
    async fn health_reports_ok_and_store_state() {
        let store = web::Data::new(StoreAccessor::new(DatabaseConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
        }));
        store.run().unwrap();
        let app = test::init_service(App::new().app_data(store.clone()).configure(configure_routes)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "running");
        store.stop().await;
    }

    #[actix_web::test]
    async fn business_errors_are_ok_responses() {
        let publisher = Arc::new(RecordingPublisher::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(task_service(publisher.clone())))
                .configure(configure_routes),
        )
        .await;
        let task_id = Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri("/image")
            .set_json(json!({
                "task_id": task_id,
                "action": "generate_preview",
                "image_url": "not a url",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let result: TaskResult = test::read_body_json(resp).await;
        assert_eq!(result.task_id, task_id);
        assert_eq!(result.error_message(), Some("Invalid image URL: not a url"));
        assert_eq!(publisher.published(), vec![result]);
    }

    #[actix_web::test]
    async fn unknown_action_still_yields_a_result() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(task_service(Arc::new(RecordingPublisher::default()))))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/image/")
            .set_json(json!({
                "task_id": Uuid::new_v4(),
                "action": "upscale",
                "image_url": "https://example.com/a.png",
            }))
            .to_request();
        let result: TaskResult = test::call_and_read_body_json(&app, req).await;
        assert_eq!(result.error_message(), Some("Unknown action: upscale"));
    }

    #[actix_web::test]
    async fn publish_failure_maps_to_bad_gateway() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(task_service(Arc::new(UnreachablePublisher))))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/image")
            .set_json(json!({
                "task_id": Uuid::new_v4(),
                "action": "search_similar",
                "image_url": "",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["message"].as_str().unwrap().starts_with("Failed to record task result"));
    }

    #[actix_web::test]
    async fn malformed_body_is_bad_request() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(task_service(Arc::new(RecordingPublisher::default()))))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/image")
            .set_json(json!({ "action": "search_similar" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
