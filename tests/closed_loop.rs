use approx::assert_relative_eq;
use nalgebra::{DMatrix, Translation3};

use flexstab::{
    Command, CommandReply, ObservationNode, Stabilizer, StabilizerError, StabilizerInputs,
    StabilizerParams, SupportPhase, TransitionNode,
};

#[test]
fn estimator_models_and_stabilizer_share_one_time_index() {
    let params = StabilizerParams::default();
    let mut f = TransitionNode::new(params.constants).unwrap();
    let mut h = ObservationNode::new();
    let mut stabilizer = Stabilizer::new(params).unwrap();
    stabilizer.start();

    let mut estimate = params.initial_flexibility_state().to_vector();
    estimate[0] = 0.01;
    let left = Translation3::new(0.0, 0.095, 0.0).to_homogeneous();
    let right = Translation3::new(0.0, -0.095, 0.0).to_homogeneous();

    for t in 0..20 {
        let flex_x = [estimate[0], estimate[1], estimate[2], estimate[3]];
        let inputs = StabilizerInputs {
            delta_com: &[estimate[0], 0.0, 0.0],
            comdot_ref: &[0.0; 3],
            flex_x: &flex_x,
            flex_y: &[0.0; 4],
            left_foot: &left,
            right_foot: &right,
            phase: SupportPhase::Single,
        };
        let ddx = stabilizer.compute_control_feedback(t, &inputs).unwrap().ddx;

        let jacobian = *f.jacobian(t, estimate.as_slice()).unwrap();
        assert_eq!(jacobian[(4, 4)], 1.0);
        let observation = *h.observation(t, estimate.as_slice()).unwrap();
        assert_relative_eq!(observation[0], estimate[0]);

        estimate = f.new_state(t, estimate.as_slice(), &[ddx]).unwrap().to_vector();
        assert_eq!(estimate[4], 425.0);
    }
    assert!(estimate.iter().all(|v| v.is_finite()));
}

#[test]
fn configuration_from_toml_drives_the_controller() {
    let params = StabilizerParams::from_toml_str(
        r#"
        time_period = 0.01

        [single_support_gains]
        k_p = 50.0
        k_p_theta = 0.0
        k_d = 0.0
        k_d_theta = 0.0
        "#,
    )
    .unwrap();
    let mut stabilizer = Stabilizer::new(params).unwrap();
    let handle = stabilizer.handle();
    assert_eq!(
        handle.execute(Command::GetTimePeriod).unwrap(),
        CommandReply::Scalar(0.01)
    );
    handle.execute(Command::Start).unwrap();

    let pose = Translation3::new(0.0, 0.0, 0.0).to_homogeneous();
    let inputs = StabilizerInputs {
        delta_com: &[0.02, 0.0, 0.0],
        comdot_ref: &[0.0; 3],
        flex_x: &[0.0; 4],
        flex_y: &[0.0; 4],
        left_foot: &pose,
        right_foot: &pose,
        phase: SupportPhase::Single,
    };
    let out = *stabilizer.compute_control_feedback(0, &inputs).unwrap();
    assert_relative_eq!(out.ddx, -1.0, epsilon = 1e-12);
    assert_relative_eq!(out.comdot[0].value, -0.01, epsilon = 1e-12);

    // Same poses are fine until double support needs a foot axis.
    let double = StabilizerInputs {
        phase: SupportPhase::Double,
        ..inputs
    };
    assert!(matches!(
        stabilizer.compute_control_feedback(1, &double),
        Err(StabilizerError::DegenerateSupportAxis { .. })
    ));
    assert_eq!(stabilizer.held_command(), Some(&out));

    let jcom = DMatrix::from_element(3, 36, 0.5);
    assert_eq!(*stabilizer.jacobian(1, &jcom).unwrap(), jcom);
}
