use crate::models::session::MessageResponse;
use rocket::serde::json::Json;
use rocket::{Request, catch};

#[catch(400)]
pub fn bad_request(_: &Request) -> Json<MessageResponse> {
    Json(MessageResponse::new("Bad request"))
}

#[catch(401)]
pub fn unauthorized(_: &Request) -> Json<MessageResponse> {
    Json(MessageResponse::new("Unauthorized"))
}

#[catch(404)]
pub fn not_found(_: &Request) -> Json<MessageResponse> {
    Json(MessageResponse::new("Not found"))
}

#[catch(413)]
pub fn payload_too_large(_: &Request) -> Json<MessageResponse> {
    Json(MessageResponse::new("Payload too large"))
}

#[catch(422)]
pub fn unprocessable_entity(_: &Request) -> Json<MessageResponse> {
    Json(MessageResponse::new("Malformed request body"))
}

#[catch(500)]
pub fn internal_error(_: &Request) -> Json<MessageResponse> {
    Json(MessageResponse::new("Internal server error"))
}

#[cfg(test)]
mod tests {
    use crate::build_rocket;
    use crate::test_utils::test_config;
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;

    #[rocket::async_test]
    async fn unknown_route_answers_json() {
        let client = Client::tracked(build_rocket(test_config()).expect("valid config"))
            .await
            .expect("valid rocket instance");
        let response = client.get("/nope").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(response.content_type(), Some(ContentType::JSON));
        let body: serde_json::Value = response.into_json().await.expect("json body");
        assert_eq!(body["message"], "Not found");
    }

    #[rocket::async_test]
    async fn malformed_login_body_is_unprocessable() {
        let client = Client::tracked(build_rocket(test_config()).expect("valid config"))
            .await
            .expect("valid rocket instance");
        let response = client
            .post("/login")
            .header(ContentType::JSON)
            .body(r#"{"username": "user""#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);
        let body: serde_json::Value = response.into_json().await.expect("json body");
        assert_eq!(body["message"], "Malformed request body");
    }
}
