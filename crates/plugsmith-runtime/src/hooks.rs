//! Hook wrapping and failure boundaries
//!
//! A hook wraps an original function with optional `before` and `after`
//! stages. `before` may replace the arguments, `after` may replace the
//! result. A failing stage is logged and its error handed back to the
//! caller unchanged.

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::error;

/// Failure raised inside a hook stage, handler or guarded call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("{0}")]
    Failed(String),

    #[error("panicked: {0}")]
    Panicked(String),
}

impl HookError {
    /// Normalize any displayable error
    pub fn from_error(err: impl Display) -> Self {
        Self::Failed(err.to_string())
    }

    /// Normalize a panic payload, which may not be a string at all
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

type BeforeFn<A, E> = Box<dyn Fn(&A) -> Result<Option<A>, E> + Send + Sync>;
type OriginalFn<A, R, E> = Box<dyn Fn(&A) -> Result<R, E> + Send + Sync>;
type AfterFn<A, R, E> = Box<dyn Fn(R, &A) -> Result<R, E> + Send + Sync>;

/// Synchronous hook around an original function
pub struct Hook<A, R, E> {
    name: String,
    original: OriginalFn<A, R, E>,
    before: Option<BeforeFn<A, E>>,
    after: Option<AfterFn<A, R, E>>,
}

/// Wrap `original` so `before`/`after` stages can be attached
pub fn wrap_hook<A, R, E, F>(name: impl Into<String>, original: F) -> Hook<A, R, E>
where
    F: Fn(&A) -> Result<R, E> + Send + Sync + 'static,
{
    Hook {
        name: name.into(),
        original: Box::new(original),
        before: None,
        after: None,
    }
}

impl<A, R, E: Display> Hook<A, R, E> {
    pub fn before<F>(mut self, stage: F) -> Self
    where
        F: Fn(&A) -> Result<Option<A>, E> + Send + Sync + 'static,
    {
        self.before = Some(Box::new(stage));
        self
    }

    pub fn after<F>(mut self, stage: F) -> Self
    where
        F: Fn(R, &A) -> Result<R, E> + Send + Sync + 'static,
    {
        self.after = Some(Box::new(stage));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run before → original → after
    pub fn call(&self, args: A) -> Result<R, E> {
        self.run(args).inspect_err(|e| {
            error!(hook = %self.name, error = %e, "Hook failed");
        })
    }

    fn run(&self, mut args: A) -> Result<R, E> {
        if let Some(before) = &self.before {
            if let Some(replaced) = before(&args)? {
                args = replaced;
            }
        }
        let result = (self.original)(&args)?;
        match &self.after {
            Some(after) => after(result, &args),
            None => Ok(result),
        }
    }
}

type AsyncBeforeFn<A, E> = Box<dyn Fn(A) -> BoxFuture<'static, Result<Option<A>, E>> + Send + Sync>;
type AsyncOriginalFn<A, R, E> = Box<dyn Fn(A) -> BoxFuture<'static, Result<R, E>> + Send + Sync>;
type AsyncAfterFn<A, R, E> = Box<dyn Fn(R, A) -> BoxFuture<'static, Result<R, E>> + Send + Sync>;

/// Asynchronous hook. Stages receive owned clones of the arguments and are
/// awaited strictly one after another.
pub struct AsyncHook<A, R, E> {
    name: String,
    original: AsyncOriginalFn<A, R, E>,
    before: Option<AsyncBeforeFn<A, E>>,
    after: Option<AsyncAfterFn<A, R, E>>,
}

/// Async counterpart of [`wrap_hook`]
pub fn wrap_hook_async<A, R, E, F, Fut>(name: impl Into<String>, original: F) -> AsyncHook<A, R, E>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    AsyncHook {
        name: name.into(),
        original: Box::new(move |args| original(args).boxed()),
        before: None,
        after: None,
    }
}

impl<A, R, E> AsyncHook<A, R, E>
where
    A: Clone + Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
{
    pub fn before<F, Fut>(mut self, stage: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<A>, E>> + Send + 'static,
    {
        self.before = Some(Box::new(move |args| stage(args).boxed()));
        self
    }

    pub fn after<F, Fut>(mut self, stage: F) -> Self
    where
        F: Fn(R, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        self.after = Some(Box::new(move |result, args| stage(result, args).boxed()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call(&self, args: A) -> Result<R, E> {
        self.run(args).await.inspect_err(|e| {
            error!(hook = %self.name, error = %e, "Async hook failed");
        })
    }

    async fn run(&self, mut args: A) -> Result<R, E> {
        if let Some(before) = &self.before {
            if let Some(replaced) = before(args.clone()).await? {
                args = replaced;
            }
        }
        let result = (self.original)(args.clone()).await?;
        match &self.after {
            Some(after) => after(result, args).await,
            None => Ok(result),
        }
    }
}

/// Run `f` inside a failure boundary. Errors and panics are normalized to
/// [`HookError`], logged and passed to `on_error`; the call then yields
/// `None`.
pub fn safe_execute<T, E, F>(f: F, on_error: Option<&dyn Fn(&HookError)>) -> Option<T>
where
    F: FnOnce() -> Result<T, E>,
    E: Display,
{
    let outcome = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => return Some(value),
        Ok(Err(e)) => HookError::from_error(e),
        Err(payload) => HookError::from_panic(payload),
    };
    report(outcome, on_error);
    None
}

/// Async counterpart of [`safe_execute`]
pub async fn safe_execute_async<T, E, Fut>(
    fut: Fut,
    on_error: Option<&(dyn Fn(&HookError) + Send + Sync)>,
) -> Option<T>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => return Some(value),
        Ok(Err(e)) => HookError::from_error(e),
        Err(payload) => HookError::from_panic(payload),
    };
    error!(error = %outcome, "Guarded call failed");
    if let Some(handler) = on_error {
        handler(&outcome);
    }
    None
}

fn report(err: HookError, on_error: Option<&dyn Fn(&HookError)>) {
    error!(error = %err, "Guarded call failed");
    if let Some(handler) = on_error {
        handler(&err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_hook_without_stages_calls_original() {
        let hook = wrap_hook("double", |x: &i32| Ok::<_, String>(x * 2));
        assert_eq!(hook.call(21), Ok(42));
        assert_eq!(hook.name(), "double");
    }

    #[test]
    fn test_before_replaces_arguments_and_after_sees_them() {
        let seen = Arc::new(Mutex::new(None));
        let seen_in_after = seen.clone();

        let hook = wrap_hook("greet", |name: &String| Ok::<_, String>(format!("hi {}", name)))
            .before(|name| Ok(Some(name.to_uppercase())))
            .after(move |result, args| {
                *seen_in_after.lock().unwrap() = Some(args.clone());
                Ok(format!("{}!", result))
            });

        assert_eq!(hook.call("ada".to_string()), Ok("hi ADA!".to_string()));
        assert_eq!(seen.lock().unwrap().as_deref(), Some("ADA"));
    }

    #[test]
    fn test_before_returning_none_keeps_arguments() {
        let hook = wrap_hook("id", |x: &i32| Ok::<_, String>(*x)).before(|_| Ok(None));
        assert_eq!(hook.call(7), Ok(7));
    }

    #[test]
    fn test_stage_error_is_returned_unchanged() {
        let called = Arc::new(Mutex::new(false));
        let called_in_original = called.clone();
        let hook = wrap_hook("guarded", move |x: &i32| {
            *called_in_original.lock().unwrap() = true;
            Ok::<_, String>(*x)
        })
        .before(|_| Err("denied".to_string()));

        assert_eq!(hook.call(1), Err("denied".to_string()));
        assert!(!*called.lock().unwrap());
    }

    #[test]
    fn test_original_error_skips_after() {
        let hook = wrap_hook("fails", |_: &i32| Err::<i32, _>("boom".to_string()))
            .after(|_, _| panic!("after must not run"));
        assert_eq!(hook.call(1), Err("boom".to_string()));
    }

    #[tokio::test]
    async fn test_async_hook_forwards_transformed_args_and_result() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (o1, o2, o3) = (order.clone(), order.clone(), order.clone());

        let hook = wrap_hook_async("fetch", move |n: u32| {
            let order = o2.clone();
            async move {
                order.lock().unwrap().push("original");
                Ok::<_, String>(n * 10)
            }
        })
        .before(move |n: u32| {
            let order = o1.clone();
            async move {
                tokio::task::yield_now().await;
                order.lock().unwrap().push("before");
                Ok(Some(n + 1))
            }
        })
        .after(move |result: u32, args: u32| {
            let order = o3.clone();
            async move {
                order.lock().unwrap().push("after");
                Ok(result + args)
            }
        });

        // before: 4 -> 5, original: 50, after: 50 + 5
        assert_eq!(hook.call(4).await, Ok(55));
        assert_eq!(*order.lock().unwrap(), vec!["before", "original", "after"]);
    }

    #[tokio::test]
    async fn test_async_hook_keeps_args_when_before_returns_none() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (s1, s2, s3) = (seen.clone(), seen.clone(), seen.clone());

        let hook = wrap_hook_async("observe", move |n: u32| {
            let seen = s2.clone();
            async move {
                seen.lock().unwrap().push(("original", n));
                Ok::<_, String>(n * 10)
            }
        })
        .before(move |n: u32| {
            let seen = s1.clone();
            async move {
                seen.lock().unwrap().push(("before", n));
                Ok(None)
            }
        })
        .after(move |result: u32, args: u32| {
            let seen = s3.clone();
            async move {
                seen.lock().unwrap().push(("after", args));
                Ok(result + 1)
            }
        });

        assert_eq!(hook.call(4).await, Ok(41));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("before", 4), ("original", 4), ("after", 4)]
        );
    }

    #[tokio::test]
    async fn test_async_hook_error_propagates() {
        let hook = wrap_hook_async("fails", |_: u32| async { Err::<u32, _>("nope".to_string()) });
        assert_eq!(hook.call(1).await, Err("nope".to_string()));
    }

    #[test]
    fn test_safe_execute_success() {
        assert_eq!(safe_execute(|| Ok::<_, String>(5), None), Some(5));
    }

    #[test]
    fn test_safe_execute_error_reaches_handler() {
        let captured = Mutex::new(None);
        let on_error = |e: &HookError| *captured.lock().unwrap() = Some(e.clone());

        let result: Option<()> = safe_execute(|| Err("bad input"), Some(&on_error));
        assert!(result.is_none());
        assert_eq!(
            *captured.lock().unwrap(),
            Some(HookError::Failed("bad input".to_string()))
        );
    }

    #[test]
    fn test_safe_execute_catches_panics() {
        let captured = Mutex::new(None);
        let on_error = |e: &HookError| *captured.lock().unwrap() = Some(e.clone());

        let result: Option<u8> = safe_execute(
            || -> Result<u8, String> { panic!("exploded") },
            Some(&on_error),
        );
        assert!(result.is_none());
        assert_eq!(
            *captured.lock().unwrap(),
            Some(HookError::Panicked("exploded".to_string()))
        );
    }

    #[test]
    fn test_non_string_panic_payload() {
        let err = HookError::from_panic(Box::new(42_u32));
        assert_eq!(err, HookError::Panicked("non-string panic payload".to_string()));
    }

    async fn explode() -> Result<(), String> {
        panic!("async boom")
    }

    #[tokio::test]
    async fn test_safe_execute_async() {
        assert_eq!(
            safe_execute_async(async { Ok::<_, String>("ok") }, None).await,
            Some("ok")
        );

        let captured = Arc::new(Mutex::new(None));
        let sink = captured.clone();
        let on_error = move |e: &HookError| *sink.lock().unwrap() = Some(e.clone());
        let result = safe_execute_async(explode(), Some(&on_error)).await;
        assert!(result.is_none());
        assert!(matches!(
            captured.lock().unwrap().as_ref(),
            Some(HookError::Panicked(m)) if m == "async boom"
        ));
    }
}
