use axum::Router;
use tokio::net::TcpListener;

/// Serve `app` as a fake vendor on a random local port. Returns its base URL.
pub async fn spawn_vendor(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    format!("http://{addr}")
}
