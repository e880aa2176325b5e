// Kept in its own binary: it observes the process-wide current device.

use subdim::backend::{get_device, set_device, HOST_DEVICE};
use subdim::{sub_dim, sub_dim_new, Tensor};

#[test]
fn test_current_device_is_restored() {
    set_device(HOST_DEVICE);

    let a = Tensor::from_f32(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let b = Tensor::from_f32(vec![2], vec![1.0, 1.0]).unwrap();
    sub_dim_new(&a, &b, 0, 1.0).unwrap();
    assert_eq!(get_device(), HOST_DEVICE);

    // precondition failure
    let short = Tensor::from_f32(vec![3], vec![1.0, 1.0, 1.0]).unwrap();
    assert!(sub_dim_new(&a, &short, 0, 1.0).is_err());
    assert_eq!(get_device(), HOST_DEVICE);

    // a device that is unlikely to exist; success or failure, the selection is undone
    let a = a.on_device(7);
    let b = b.on_device(7);
    let mut c = a.zeros_like();
    let _ = sub_dim(&a, &b, &mut c, 1, 2.0);
    assert_eq!(get_device(), HOST_DEVICE);

    set_device(3);
    let a = a.on_device(HOST_DEVICE);
    let b = b.on_device(HOST_DEVICE);
    sub_dim_new(&a, &b, 1, 2.0).unwrap();
    assert_eq!(get_device(), 3);
    set_device(HOST_DEVICE);
}
