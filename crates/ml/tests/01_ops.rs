use std::sync::Arc;

use ml::{NoGrad, Tensor, TensorStore};

#[test]
fn matmul_batched_and_vector() {
    let mut tensors = TensorStore::new();
    let mut g = NoGrad::new();
    // W = [[1, 2], [3, 4], [5, 6]]  (out 3, in 2)
    let w = Tensor::from_vec(vec![3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let x = Tensor::from_vec(vec![2], vec![1.0, -1.0]);
    let y = w.matmul(&x, &mut g, &mut tensors);
    assert_eq!(y.shape, vec![3]);
    assert_eq!(y.data, vec![-1.0, -1.0, -1.0]);

    let xs = Tensor::from_vec(vec![2, 2], vec![1.0, 0.0, 0.0, 1.0]);
    let ys = w.matmul(&xs, &mut g, &mut tensors);
    assert_eq!(ys.shape, vec![2, 3]);
    assert_eq!(ys.data, vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]);
}

#[test]
fn broadcast_ops_repeat_over_rows() {
    let mut tensors = TensorStore::new();
    let mut g = NoGrad::new();
    let a = Tensor::from_vec(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    let b = Tensor::from_vec(vec![2], vec![10.0, -1.0]);
    assert_eq!(a.add_broadcast(&b, &mut g, &mut tensors).data, vec![11.0, 1.0, 13.0, 3.0]);
    assert_eq!(a.mul_broadcast(&b, &mut g, &mut tensors).data, vec![10.0, -2.0, 30.0, -4.0]);
}

#[test]
fn concat_slice_and_reductions() {
    let mut tensors = TensorStore::new();
    let mut g = NoGrad::new();
    let a = Tensor::from_vec(vec![2], vec![1.0, 2.0]);
    let b = Tensor::from_vec(vec![3], vec![3.0, 4.0, 5.0]);
    let c = Tensor::concat_all(&[a.clone(), b], &mut g, &mut tensors);
    assert_eq!(c.data, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    assert_eq!(c.slice(1, 3, &mut g, &mut tensors).data, vec![2.0, 3.0, 4.0]);
    assert_eq!(c.reduce_sum(&mut g, &mut tensors).data, vec![15.0]);
    assert_eq!(c.reduce_mean(&mut g, &mut tensors).data, vec![3.0]);

    let single = Tensor::concat_all(&[a.clone()], &mut g, &mut tensors);
    assert_eq!(single.id, a.id);
}

#[test]
fn solve_inverts_matmul() {
    let mut tensors = TensorStore::new();
    let mut g = NoGrad::new();
    let m = Tensor::from_vec(vec![2, 2], vec![2.0, 0.5, 0.5, 1.0]);
    let x = Tensor::from_vec(vec![2], vec![0.3, -0.7]);
    let b = m.matmul(&x, &mut g, &mut tensors);
    let back = m.solve(&b, &mut g, &mut tensors);
    for (r, e) in back.data.iter().zip(&x.data) {
        assert!((r - e).abs() < 1e-5);
    }
}

#[test]
fn reshape_keeps_data() {
    let mut tensors = TensorStore::new();
    let a = Tensor::from_vec(vec![4], vec![1.0, 2.0, 3.0, 4.0]);
    let r = a.reshape(vec![2, 2], &mut NoGrad::new(), &mut tensors);
    assert_eq!(r.shape, vec![2, 2]);
    assert_eq!(r.data, a.data);
    let idx: Arc<[Option<usize>]> = vec![Some(3), Some(0)].into();
    assert_eq!(a.gather(idx, vec![2], &mut NoGrad::new(), &mut tensors).data, vec![4.0, 1.0]);
}
