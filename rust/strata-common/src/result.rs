pub type Result<T> = std::result::Result<T, crate::error::Error>;

#[macro_export]
macro_rules! verify_arg {
    ($name:expr, $expr:expr) => {{
        let result = $expr;
        $crate::result::verify_arg(result, stringify!($name), stringify!($expr))?;
    }};
}

/// Fails with `PositionOutOfBounds` unless `index < bound`.
#[macro_export]
macro_rules! verify_index {
    ($index:expr, $bound:expr) => {{
        $crate::result::verify_index($index, $bound)?;
    }};
}

/// Fails with `InvalidRange` unless `offset + length <= bound`.
#[macro_export]
macro_rules! verify_range {
    ($what:expr, $offset:expr, $length:expr, $bound:expr) => {{
        $crate::result::verify_range($what, $offset, $length, $bound)?;
    }};
}

#[inline]
pub fn verify_arg(predicate: bool, name: &str, condition: &str) -> Result<()> {
    if predicate {
        Ok(())
    } else {
        invalid_arg(name, condition)
    }
}

#[inline]
pub fn verify_index(index: usize, bound: usize) -> Result<()> {
    if index < bound {
        Ok(())
    } else {
        Err(crate::error::Error::position_out_of_bounds(index, bound))
    }
}

#[inline]
pub fn verify_range(what: &str, offset: usize, length: usize, bound: usize) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= bound => Ok(()),
        _ => Err(crate::error::Error::invalid_range(what, offset, length, bound)),
    }
}

#[cold]
pub fn invalid_arg(name: &str, condition: &str) -> Result<()> {
    Err(crate::error::ErrorKind::InvalidArgument {
        name: name.to_string(),
        message: condition.to_string(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn check(len: usize) -> Result<()> {
        verify_arg!(len, len % 2 == 0);
        Ok(())
    }

    #[test]
    fn test_verify_arg() {
        assert!(check(4).is_ok());
        let err = check(3).unwrap_err();
        match err.kind() {
            ErrorKind::InvalidArgument { name, message } => {
                assert_eq!(name, "len");
                assert_eq!(message, "len % 2 == 0");
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_verify_range_overflow() {
        assert!(verify_range("region", 2, 3, 5).is_ok());
        assert!(verify_range("region", 3, 3, 5).is_err());
        assert!(verify_range("region", usize::MAX, 2, 5).is_err());
    }
}
