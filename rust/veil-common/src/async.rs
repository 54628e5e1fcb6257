use std::future::Future;

/// Schedule a future on the local executor without waiting for it. The
/// future keeps running until it completes or the executor shuts down.
#[cfg(target_arch = "wasm32")]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Schedule a future on the local executor without waiting for it. The
/// future keeps running until it completes or the runtime shuts down.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(future);
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn it_runs_detached_futures_to_completion() {
        let (tx, rx) = oneshot::channel();
        spawn_detached(async move {
            let _ = tx.send("done");
        });
        assert_eq!(rx.await.unwrap(), "done");
    }
}
