use super::{Error, ErrorKind, Result};
use easy_ext::ext;

#[ext(OptionExt)]
pub(crate) impl<T> Option<T> {
    #[track_caller]
    fn fatal_ctx<S>(self, message: impl FnOnce() -> S) -> Result<T>
    where
        S: Into<String>,
    {
        match self {
            Some(value) => Ok(value),
            None => Err(Error::from(ErrorKind::Fatal {
                message: message().into(),
                source: None,
            })),
        }
    }
}
