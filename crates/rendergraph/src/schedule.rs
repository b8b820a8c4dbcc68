use crate::error::GraphError;
use crate::pass::{Pass, PassHandle};

/// Conventional Shadertoy buffer names, drawn first and in this order.
pub const BUFFER_LABELS: [&str; 4] = ["Buf A", "Buf B", "Buf C", "Buf D"];

/// Compute the per-frame draw order.
///
/// Buffer passes named after [`BUFFER_LABELS`] (case-insensitive) come first
/// in label order, remaining buffer passes follow by ascending output id, and
/// the image pass is always last. The order is stable across frames.
pub fn draw_order(passes: &[Pass]) -> Result<Vec<PassHandle>, GraphError> {
    let mut image: Option<&Pass> = None;
    let mut labelled: Vec<(usize, &Pass)> = Vec::new();
    let mut others: Vec<&Pass> = Vec::new();

    for pass in passes {
        if pass.is_image() {
            if let Some(first) = image {
                return Err(GraphError::MultipleImagePasses {
                    first: first.name().to_string(),
                    second: pass.name().to_string(),
                });
            }
            image = Some(pass);
            continue;
        }
        match label_rank(pass.name()) {
            Some(rank) => labelled.push((rank, pass)),
            None => others.push(pass),
        }
    }
    let image = image.ok_or(GraphError::MissingImagePass)?;

    labelled.sort_by_key(|(rank, pass)| (*rank, pass.handle()));
    others.sort_by(|a, b| a.output().cmp(&b.output()).then(a.handle().cmp(&b.handle())));

    let order: Vec<PassHandle> = labelled
        .into_iter()
        .map(|(_, pass)| pass.handle())
        .chain(others.into_iter().map(Pass::handle))
        .chain(std::iter::once(image.handle()))
        .collect();
    Ok(order)
}

fn label_rank(name: &str) -> Option<usize> {
    BUFFER_LABELS
        .iter()
        .position(|label| label.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::{OutputId, ShaderSource};

    fn pass(index: u32, name: &str, output: Option<&str>) -> Pass {
        Pass::new(
            PassHandle(index),
            name.to_string(),
            output.map(OutputId::from),
            Default::default(),
            ShaderSource::new(),
        )
    }

    #[test]
    fn labels_then_ids_then_image() {
        let passes = vec![
            pass(0, "Image", None),
            pass(1, "feedback", Some("300")),
            pass(2, "BUF C", Some("259")),
            pass(3, "Buf A", Some("257")),
            pass(4, "scratch", Some("12")),
        ];
        let order = draw_order(&passes).unwrap();
        assert_eq!(
            order,
            vec![PassHandle(3), PassHandle(2), PassHandle(4), PassHandle(1), PassHandle(0)]
        );
    }

    #[test]
    fn image_pass_is_last_even_alone() {
        let passes = vec![pass(0, "Image", None)];
        assert_eq!(draw_order(&passes).unwrap(), vec![PassHandle(0)]);
    }

    #[test]
    fn image_pass_is_required_and_unique() {
        let passes = vec![pass(0, "Buf A", Some("1"))];
        assert!(matches!(draw_order(&passes), Err(GraphError::MissingImagePass)));

        let passes = vec![pass(0, "Image", None), pass(1, "Other", None)];
        assert!(matches!(
            draw_order(&passes),
            Err(GraphError::MultipleImagePasses { .. })
        ));
    }
}
