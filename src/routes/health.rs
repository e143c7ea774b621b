use rocket::{http::Status, routes};

/// Liveness check. Not behind the activity gate.
#[rocket::get("/")]
pub async fn healthcheck() -> Status {
    Status::Ok
}

pub fn routes() -> Vec<rocket::Route> {
    routes![healthcheck]
}

#[cfg(test)]
mod tests {
    use crate::build_rocket;
    use crate::test_utils::test_config;
    use rocket::http::Status;
    use rocket::local::asynchronous::Client;

    #[rocket::async_test]
    async fn health_check_works() {
        let client = Client::tracked(build_rocket(test_config()).expect("valid config"))
            .await
            .expect("valid rocket instance");
        let response = client.get("/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }
}
