//! Validation error capture around wgpu object creation.

/// Runs `f` inside a validation error scope on `device`.
///
/// Validation failures raised while `f` runs come back as `Err(reason)`
/// instead of reaching the uncaptured error handler. The value `f` built is
/// dropped in that case.
pub(super) fn validated<T>(
    device: &wgpu::Device,
    label: &str,
    f: impl FnOnce() -> T,
) -> std::result::Result<T, String> {
    let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    scope_result(label, pollster::block_on(scope.pop()))?;
    Ok(value)
}

fn scope_result(label: &str, error: Option<wgpu::Error>) -> std::result::Result<(), String> {
    match error {
        None => Ok(()),
        Some(err) => {
            log::warn!("wgpu validation error in '{label}': {err}");
            Err(format!("wgpu validation error in '{label}': {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scope_is_ok() {
        assert_eq!(scope_result("paint pipeline", None), Ok(()));
    }

    #[test]
    fn validation_error_carries_label_and_description() {
        let err = wgpu::Error::Validation {
            source: Box::new(std::fmt::Error),
            description: "vertex attribute 0 type mismatch".into(),
        };
        let reason = scope_result("paint pipeline", Some(err)).unwrap_err();
        assert!(reason.contains("'paint pipeline'"), "{reason}");
        assert!(reason.contains("vertex attribute 0 type mismatch"), "{reason}");
    }
}
