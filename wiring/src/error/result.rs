use super::AppError;

/// 框架标准 Result 类型
///
/// # 示例
///
/// ```no_run
/// use wiring::error::{AppError, AppResult};
/// use wiring::handler::Arguments;
///
/// async fn show_user(args: Arguments) -> AppResult<String> {
///     let id = args.get::<String>("id")?;
///     if id.is_empty() {
///         return Err(AppError::BadRequest("id is required".to_string()));
///     }
///     Ok(format!("user {id}"))
/// }
/// ```
pub type AppResult<T> = Result<T, AppError>;
