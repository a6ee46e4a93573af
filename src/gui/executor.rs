use std::future::Future;
use iced_futures::{Executor, MaybeSend};
use tokio::runtime::{Builder, Runtime};

// commands run on a multi threaded tokio runtime with the io and time drivers enabled
pub struct MyExecutor {
    runtime: Runtime,
}

impl Executor for MyExecutor {
    fn new() -> Result<Self, futures::io::Error> {
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("robot-remote-worker")
            .build()?;

        Ok(MyExecutor { runtime })
    }

    fn spawn(&self, future: impl Future<Output = ()> + MaybeSend + 'static) {
        let _ = self.runtime.spawn(future);
    }

    fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.runtime.enter();
        f()
    }
}
