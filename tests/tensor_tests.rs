use half::f16;
use subdim::backend::HOST_DEVICE;
use subdim::{tensor, DataType, SubDimError, Tensor, TensorData};

#[test]
fn test_tensor_creation() {
    let t = Tensor::from_f32(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    assert_eq!(t.dim_size(), &[2, 2]);
    assert_eq!(t.order(), 2);
    assert_eq!(t.unit_num(), 4);
    assert_eq!(t.as_f32().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    assert_eq!(t.dev_id(), HOST_DEVICE);
    assert!(!t.is_sparse());
}

#[test]
fn test_tensor_macro() {
    let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
    assert_eq!(t.dim_size(), &[2, 2]);
    assert_eq!(t.as_f32().unwrap(), &[1.0, 2.0, 3.0, 4.0]);

    let t = tensor!([[[1.0], [(-2.0)]], [[3], [4]]]);
    assert_eq!(t.dim_size(), &[2, 2, 1]);
    assert_eq!(t.to_f32_vec(), vec![1.0, -2.0, 3.0, 4.0]);
}

#[test]
#[should_panic(expected = "ragged")]
fn test_ragged_macro_panics() {
    let _ = tensor!([[1.0, 2.0], [3.0]]);
}

#[test]
fn test_invalid_shapes_are_rejected() {
    assert!(matches!(
        Tensor::from_f32(vec![2, 3], vec![0.0; 5]),
        Err(SubDimError::InvalidTensor(_))
    ));
    assert!(matches!(
        Tensor::from_f32(Vec::new(), vec![1.0]),
        Err(SubDimError::InvalidTensor(_))
    ));
    assert!(matches!(
        Tensor::zeros(vec![4, 0, 2], DataType::Float32),
        Err(SubDimError::InvalidTensor(_))
    ));
}

#[test]
fn test_zeros_like_keeps_type_and_device() {
    let t = Tensor::from_f16(vec![3, 1], vec![f16::ONE; 3]).unwrap().on_device(2);
    let z = t.zeros_like();
    assert_eq!(z.data_type(), DataType::Float16);
    assert_eq!(z.dev_id(), 2);
    assert!(z.same_shape(&t));
    assert_eq!(z.to_f32_vec(), vec![0.0; 3]);
}

#[test]
fn test_storage_views() {
    let t = Tensor::new(vec![3], TensorData::I32(vec![1, -2, 3])).unwrap();
    assert_eq!(t.data_type(), DataType::Int32);
    assert!(t.as_f32().is_none());
    assert!(t.as_f16().is_none());
    assert_eq!(t.to_f32_vec(), vec![1.0, -2.0, 3.0]);

    let h = Tensor::from_f16(vec![2], vec![f16::from_f32(0.5), f16::from_f32(-1.5)]).unwrap();
    assert_eq!(h.to_f32_vec(), vec![0.5, -1.5]);
}

#[test]
fn test_data_type_metadata() {
    assert_eq!(DataType::Float32.size_of(), 4);
    assert_eq!(DataType::Float16.size_of(), 2);
    assert_eq!(DataType::Int32.size_of(), 4);
    assert_eq!(DataType::Float16.to_string(), "f16");
}
