//! Extensions to `Result`.

/// Flip `Result<T, E>` to `Result<E, T>`.
pub trait FlipResult<T, E> {
    /// Flip `Result<T, E>` to `Result<E, T>`.
    fn flip(self) -> Result<E, T>;
}

impl<T, E> FlipResult<T, E> for Result<T, E> {
    fn flip(self) -> Result<E, T> {
        match self {
            Ok(t) => Err(t),
            Err(e) => Ok(e),
        }
    }
}

/// Wrap any value as the `Err` variant of a `Result`.
///
/// Most useful for turning a bare error context (or an already-built
/// [`error_stack::Report`]) into a `Result` without reaching for `Err(...)`
/// syntax, so it reads naturally at the end of a method chain.
pub trait WrapErr<T> {
    /// Wrap `self` as `Err(self)`.
    fn wrap_err(self) -> Result<T, Self>
    where
        Self: Sized;
}

impl<T, E> WrapErr<T> for E {
    fn wrap_err(self) -> Result<T, Self> {
        Err(self)
    }
}

/// Wrap any value as the `Ok` variant of a `Result`.
pub trait WrapOk<E> {
    /// Wrap `self` as `Ok(self)`.
    fn wrap_ok(self) -> Result<Self, E>
    where
        Self: Sized;
}

impl<T, E> WrapOk<E> for T {
    fn wrap_ok(self) -> Result<Self, E> {
        Ok(self)
    }
}

/// Discard the success value of a `Result`, keeping only whether it succeeded.
pub trait DiscardResult<E> {
    /// Discard the success value, retaining only success/failure.
    fn discard_result(self) -> Result<(), E>;
}

impl<T, E> DiscardResult<E> for Result<T, E> {
    fn discard_result(self) -> Result<(), E> {
        self.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip() {
        let ok: Result<i32, &str> = Ok(1);
        assert_eq!(ok.flip(), Err(1));

        let err: Result<i32, &str> = Err("nope");
        assert_eq!(err.flip(), Ok("nope"));
    }

    #[test]
    fn wrap_err_and_ok() {
        let wrapped: Result<(), &str> = "boom".wrap_err();
        assert_eq!(wrapped, Err("boom"));

        let wrapped: Result<&str, ()> = "fine".wrap_ok();
        assert_eq!(wrapped, Ok("fine"));
    }

    #[test]
    fn discard_result() {
        let ok: Result<i32, &str> = Ok(1);
        assert_eq!(ok.discard_result(), Ok(()));

        let err: Result<i32, &str> = Err("nope");
        assert_eq!(err.discard_result(), Err("nope"));
    }
}
