pub mod eip1193;

pub use self::eip1193::Eip1193;
use wasm_bindgen::prelude::*;

/// Resolve after `millis` milliseconds, driven by the browser event loop.
///
/// When no window is available the future resolves immediately instead of
/// hanging forever.
pub async fn sleep(millis: i32) {
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        let scheduled = web_sys::window().and_then(|window| {
            window
                .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, millis)
                .ok()
        });
        if scheduled.is_none() {
            let _ = resolve.call0(&JsValue::NULL);
        }
    });
    let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
}
