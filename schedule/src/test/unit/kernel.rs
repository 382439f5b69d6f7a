use tessel_ir::{Index, KernelPredicate, Operand, Tensor};

use crate::constraints::CodePositionConstraints;
use crate::kernel::Kernel;
use crate::test::helpers::nest_2d;

#[test]
fn kernels_get_fresh_slots_unless_shared() {
    let a = Kernel::new("a").define(|_, _| Ok(()));
    let b = Kernel::new("b").define(|_, _| Ok(()));
    let b_boundary = Kernel::new("b_boundary").same_slot_as(&b).define(|_, _| Ok(()));

    assert_ne!(a.slot(), b.slot());
    assert_eq!(b.slot(), b_boundary.slot());
    assert_ne!(b.id(), b_boundary.id());
}

#[test]
fn kernel_groups_preserve_registration_order() {
    let (mut nest, i, j) = nest_2d(4, 4);
    let main = Kernel::new("main").indices([i.clone(), j.clone()]).define(|_, _| Ok(()));
    let boundary = Kernel::new("main_boundary").same_slot_as(&main).indices([i, j.clone()]).define(|_, _| Ok(()));
    let other = Kernel::new("other").indices([j.clone()]).define(|_, _| Ok(()));

    nest.add_kernel(main.clone());
    nest.add_kernel_with_predicate(boundary, KernelPredicate::last(&j));
    nest.add_kernel_with_constraints(other, CodePositionConstraints::epilogue([j]));

    let groups = nest.kernel_groups();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].slot, main.slot());
    assert_eq!(groups[0].members, vec![0, 1]);
    assert_eq!(groups[1].members, vec![2]);
}

#[test]
fn kernel_invokes_its_callback_with_operands() {
    let t = Tensor::zeros("t", &[2]);
    let operand = Operand::new(&t);
    let kernel = Kernel::new("write")
        .args([operand.clone()])
        .indices([Index::new("i")])
        .define(|ops, idx| ops[0].set(&[idx[0]], 42.0));

    kernel.invoke(kernel.args(), &[1]).unwrap();
    assert_eq!(t.get(&[1]).unwrap(), 42.0);
}
