use casaba::{
    Crop, Dimensions, Format, OperationList, ReductionFactor, Rotate, Scale, Sharpen, Transpose,
};
use proptest::prelude::*;

fn dimension_strategy() -> impl Strategy<Value = Dimensions> {
    (1u32..=8192, 1u32..=8192).prop_map(|(w, h)| Dimensions::new(w, h))
}

proptest! {
    #[test]
    fn pixel_crop_never_exceeds_source_bounds(
        full in dimension_strategy(),
        x in 0.0f64..10000.0,
        y in 0.0f64..10000.0,
        w in 0.5f64..10000.0,
        h in 0.5f64..10000.0,
    ) {
        let rect = Crop::pixels(x, y, w, h).rectangle(full);
        prop_assert!(rect.width >= 1);
        prop_assert!(rect.height >= 1);
        prop_assert!(rect.x + rect.width <= full.width);
        prop_assert!(rect.y + rect.height <= full.height);
    }

    #[test]
    fn percent_crop_never_exceeds_source_bounds(
        full in dimension_strategy(),
        x in 0.0f64..1.0,
        y in 0.0f64..1.0,
        w in 0.001f64..1.5,
        h in 0.001f64..1.5,
    ) {
        let rect = Crop::percent(x, y, w, h).rectangle(full);
        prop_assert!(rect.width >= 1);
        prop_assert!(rect.height >= 1);
        prop_assert!(rect.x + rect.width <= full.width);
        prop_assert!(rect.y + rect.height <= full.height);
    }

    #[test]
    fn square_crop_is_square_and_in_bounds(full in dimension_strategy()) {
        let rect = Crop::square().rectangle(full);
        prop_assert_eq!(rect.width, rect.height);
        prop_assert_eq!(rect.width, full.shortest_side());
        prop_assert!(rect.x + rect.width <= full.width);
        prop_assert!(rect.y + rect.height <= full.height);
    }

    #[test]
    fn reduced_crop_stays_within_reduced_raster(
        full in dimension_strategy(),
        x in 0.0f64..10000.0,
        y in 0.0f64..10000.0,
        w in 1.0f64..10000.0,
        h in 1.0f64..10000.0,
        factor in 0u32..=5,
    ) {
        let reduction = ReductionFactor::new(factor);
        let rect = Crop::pixels(x, y, w, h).rectangle_reduced(full, reduction);
        let scale = reduction.scale();
        let reduced_w = ((full.width as f64 * scale).round() as u32).max(1);
        let reduced_h = ((full.height as f64 * scale).round() as u32).max(1);
        prop_assert!(rect.x + rect.width <= reduced_w);
        prop_assert!(rect.y + rect.height <= reduced_h);
    }

    #[test]
    fn fit_inside_never_exceeds_either_bound(
        input in dimension_strategy(),
        max_w in 3u32..=4000,
        max_h in 3u32..=4000,
    ) {
        let out = Scale::fit_inside(max_w, max_h).resolve(input);
        // The 3 px floor may override the bound for degenerate requests;
        // otherwise both axes stay inside the box.
        prop_assert!(out.width <= max_w.max(3));
        prop_assert!(out.height <= max_h.max(3));
    }

    #[test]
    fn scale_resolution_floors_at_three_pixels(
        input in (3u32..=8192, 3u32..=8192).prop_map(|(w, h)| Dimensions::new(w, h)),
        percent in 0.000001f64..1.0,
    ) {
        let out = Scale::percent(percent).resolve(input);
        prop_assert!(out.width >= 3);
        prop_assert!(out.height >= 3);
    }

    #[test]
    fn reduction_factor_always_over_delivers(
        scale in 0.0001f64..1.0,
        cap in 0u32..=8,
    ) {
        let reduction = ReductionFactor::for_scale(scale, cap);
        prop_assert!(reduction.factor <= cap);
        // Either the chosen reduction still delivers at least the requested
        // scale, or the cap forced a shallower-than-ideal choice.
        prop_assert!(reduction.scale() >= scale || reduction.factor == cap);
        // Never shallower than necessary: one step deeper would under-deliver
        // (unless the cap stopped us first).
        if reduction.factor < cap {
            prop_assert!(ReductionFactor::new(reduction.factor + 1).scale() < scale);
        }
    }

    #[test]
    fn operations_iterate_in_canonical_order(
        use_crop in any::<bool>(),
        use_scale in any::<bool>(),
        use_transpose in any::<bool>(),
        use_rotate in any::<bool>(),
        use_sharpen in any::<bool>(),
    ) {
        let mut ops = OperationList::new("x", Format::Jpg);
        // Deliberately attach in reverse of the application order.
        if use_sharpen {
            ops = ops.with_sharpen(Sharpen::new(1.0));
        }
        if use_rotate {
            ops = ops.with_rotate(Rotate::new(45.0));
        }
        if use_transpose {
            ops = ops.with_transpose(Transpose::Horizontal);
        }
        if use_scale {
            ops = ops.with_scale(Scale::fit_width(100));
        }
        if use_crop {
            ops = ops.with_crop(Crop::square());
        }

        let order: Vec<u8> = ops
            .iter()
            .map(|op| match op {
                casaba::Operation::Crop(_) => 0,
                casaba::Operation::Scale(_) => 1,
                casaba::Operation::Transpose(_) => 2,
                casaba::Operation::Rotate(_) => 3,
                casaba::Operation::ColorReduce(_) => 4,
                casaba::Operation::Sharpen(_) => 5,
            })
            .collect();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        prop_assert_eq!(order, sorted);
    }

    #[test]
    fn resolved_size_matches_crop_then_scale(
        full in dimension_strategy(),
        crop_w in 0.1f64..1.0,
        crop_h in 0.1f64..1.0,
        target in 3u32..=2000,
    ) {
        let crop = Crop::percent(0.0, 0.0, crop_w, crop_h);
        let scale = Scale::fit_width(target);
        let ops = OperationList::new("x", Format::Png)
            .with_crop(crop)
            .with_scale(scale);
        let expected = scale.resolve(crop.rectangle(full).size());
        prop_assert_eq!(ops.resolved_size(full), expected);
    }
}
