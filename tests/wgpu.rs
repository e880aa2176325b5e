#![cfg(feature = "wgpu")]

use half::f16;
use subdim::ops::wgpu::{context, supports_half_precision};
use subdim::{sub_dim_me, sub_dim_new, Tensor};

fn adapter_available() -> bool {
    match context(0) {
        Ok(_) => true,
        Err(e) => {
            eprintln!("skipping wgpu test: {e}");
            false
        }
    }
}

fn iota(shape: &[usize]) -> Vec<f32> {
    let n: usize = shape.iter().product();
    (0..n).map(|x| (x % 97) as f32 * 0.5 - 20.0).collect()
}

#[test]
fn test_gpu_matches_host_f32() {
    if !adapter_available() {
        return;
    }

    for (shape, n) in [
        (vec![3usize, 70, 9], 1usize),
        (vec![5, 300], 1),
        (vec![300, 5], 0),
        (vec![2, 3, 4], 2),
    ] {
        let host_a = Tensor::from_f32(shape.clone(), iota(&shape)).unwrap();
        let host_b = Tensor::from_f32(
            vec![shape[n]],
            (0..shape[n]).map(|x| x as f32 * 0.25).collect(),
        )
        .unwrap();
        let gpu_a = host_a.clone().on_device(0);
        let gpu_b = host_b.clone().on_device(0);

        for beta in [1.0f32, 2.0, -0.5] {
            let expected = sub_dim_new(&host_a, &host_b, n, beta).unwrap();
            let actual = sub_dim_new(&gpu_a, &gpu_b, n, beta).unwrap();
            assert_eq!(actual.dev_id(), 0);
            for (g, h) in actual.to_f32_vec().iter().zip(expected.to_f32_vec()) {
                assert!(
                    (g - h).abs() <= f32::EPSILON * h.abs().max(1.0),
                    "shape {shape:?}, axis {n}: gpu {g} vs host {h}"
                );
            }
        }
    }
}

#[test]
fn test_gpu_in_place() {
    if !adapter_available() {
        return;
    }

    let a = Tensor::from_f32(vec![4, 6], iota(&[4, 6])).unwrap();
    let b = Tensor::from_f32(vec![4], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let expected = sub_dim_new(&a, &b, 0, 3.0).unwrap();

    let mut gpu_a = a.on_device(0);
    sub_dim_me(&mut gpu_a, &b.on_device(0), 0, 3.0).unwrap();
    for (g, h) in gpu_a.to_f32_vec().iter().zip(expected.to_f32_vec()) {
        assert!((g - h).abs() <= f32::EPSILON * h.abs().max(1.0));
    }
}

#[test]
fn test_gpu_sweeps_past_the_group_limit() {
    if !adapter_available() {
        return;
    }

    // more than 65535 groups along x at 256 work-items per group
    let len = 20_000_000usize;
    let a = Tensor::from_f32(vec![1, len], vec![3.0; len]).unwrap();
    let b = Tensor::from_f32(vec![len], (0..len).map(|x| (x % 7) as f32).collect()).unwrap();
    let c = sub_dim_new(&a.on_device(0), &b.on_device(0), 1, 1.0).unwrap();
    for (i, &v) in c.as_f32().unwrap().iter().enumerate() {
        assert_eq!(v, 3.0 - (i % 7) as f32, "element {i}");
    }
}

#[test]
fn test_gpu_half_precision() {
    if !adapter_available() || !supports_half_precision(0).unwrap_or(false) {
        return;
    }

    let shape = [3usize, 5, 7];
    let a: Vec<f16> = iota(&shape).into_iter().map(f16::from_f32).collect();
    let b: Vec<f16> = (0..5).map(|x| f16::from_f32(x as f32)).collect();
    let host_a = Tensor::from_f16(shape.to_vec(), a).unwrap();
    let host_b = Tensor::from_f16(vec![5], b).unwrap();

    let expected = sub_dim_new(&host_a, &host_b, 1, 1.5).unwrap();
    let actual = sub_dim_new(&host_a.clone().on_device(0), &host_b.clone().on_device(0), 1, 1.5).unwrap();
    for (g, h) in actual.to_f32_vec().iter().zip(expected.to_f32_vec()) {
        assert!((g - h).abs() <= 1e-2 * h.abs().max(1.0));
    }
}
