//! End-to-end behaviour of the multi-stage step against in-memory clients.

#[cfg(test)]
mod tests {
    use crate::api::{
        ClusterProfile, DeferredParameters, LiteralTestStep, MockParameters, MultiStageTestConfiguration,
        ParameterError, Parameters,
    };
    use crate::cancellation::CancellationToken;
    use crate::config::ExecutorConfig;
    use crate::core::Phase;
    use crate::errors::{ConfigurationError, MultiStageError};
    use crate::resources::ResourceRequest;
    use crate::steps::{MultiStageTestStep, Step};
    use crate::testing::{dry_logger, fast_config, job_spec, step, FakePodClient, FakeSecretClient, PodOutcome};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    struct Harness {
        pods: Arc<FakePodClient>,
        secrets: Arc<FakeSecretClient>,
        step: MultiStageTestStep,
    }

    fn harness_with(
        test: MultiStageTestConfiguration,
        config: ExecutorConfig,
        params: Arc<dyn Parameters>,
        pods: FakePodClient,
        secrets: FakeSecretClient,
    ) -> Harness {
        let pods = Arc::new(pods);
        let secrets = Arc::new(secrets);
        let step = MultiStageTestStep::new(test, config, params, pods.clone(), secrets.clone(), job_spec());
        Harness { pods, secrets, step }
    }

    fn harness(test: MultiStageTestConfiguration, pods: FakePodClient) -> Harness {
        harness_with(
            test,
            fast_config(),
            Arc::new(DeferredParameters::new()),
            pods,
            FakeSecretClient::new(),
        )
    }

    fn definition(pre: &[&str], test: &[&str], post: &[&str]) -> MultiStageTestConfiguration {
        let steps = |names: &[&str]| names.iter().map(|n| step(n, "true")).collect::<Vec<_>>();
        let mut config = MultiStageTestConfiguration::new("e2e");
        config.pre = steps(pre);
        config.test = steps(test);
        config.post = steps(post);
        config
    }

    fn ctx() -> Arc<CancellationToken> {
        Arc::new(CancellationToken::new())
    }

    fn leaves(err: MultiStageError) -> Vec<MultiStageError> {
        match err {
            MultiStageError::Aggregate(aggregate) => aggregate.flatten(),
            other => vec![other],
        }
    }

    #[tokio::test]
    async fn test_empty_definition_succeeds() {
        let mut h = harness(MultiStageTestConfiguration::new("e2e"), FakePodClient::new());

        h.step.run(ctx()).await.unwrap();

        assert!(h.step.subtests().is_empty());
        assert!(h.pods.created().is_empty());
        assert_eq!(h.secrets.ops(), vec!["delete e2e", "create e2e"]);
    }

    #[tokio::test]
    async fn test_all_phases_run_in_order() {
        let mut h = harness(definition(&["setup"], &["test"], &["teardown"]), FakePodClient::new());

        h.step.run(ctx()).await.unwrap();

        assert_eq!(h.pods.created(), vec!["e2e-setup", "e2e-test", "e2e-teardown"]);
        let names: Vec<_> = h.step.subtests().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "Run multi-stage test e2e - e2e-setup container setup",
                "Run multi-stage test e2e - e2e-test container test",
                "Run multi-stage test e2e - e2e-teardown container teardown",
            ]
        );
    }

    #[tokio::test]
    async fn test_pre_failure_skips_test_phase() {
        let pods = FakePodClient::new().with_outcome("e2e-setup", PodOutcome::Fail("install failed".to_string()));
        let mut h = harness(definition(&["setup"], &["test"], &["teardown"]), pods);

        let err = h.step.run(ctx()).await.unwrap_err();

        assert_eq!(h.pods.created(), vec!["e2e-setup", "e2e-teardown"]);
        let message = err.to_string();
        assert!(message.starts_with("\"e2e\" pre steps failed"), "{message}");
        assert!(message.contains("install failed"));

        let errors = leaves(err);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].phase(), Some(Phase::Pre));
        assert_eq!(h.step.subtests().len(), 2);
    }

    #[tokio::test]
    async fn test_test_failure_still_runs_post() {
        let pods = FakePodClient::new().with_outcome("e2e-test", PodOutcome::Fail("1 test failed".to_string()));
        let mut h = harness(definition(&["setup"], &["test", "more"], &["teardown"]), pods);

        let err = h.step.run(ctx()).await.unwrap_err();

        assert_eq!(h.pods.created(), vec!["e2e-setup", "e2e-test", "e2e-teardown"]);
        assert_eq!(leaves(err)[0].phase(), Some(Phase::Test));
    }

    #[tokio::test]
    async fn test_every_post_failure_is_reported() {
        let pods = FakePodClient::new()
            .with_outcome("e2e-a", PodOutcome::Fail("a".to_string()))
            .with_outcome("e2e-b", PodOutcome::Fail("b".to_string()));
        let mut h = harness(definition(&[], &[], &["a", "b", "c"]), pods);

        let err = h.step.run(ctx()).await.unwrap_err();

        assert_eq!(h.pods.created(), vec!["e2e-a", "e2e-b", "e2e-c"]);
        let errors = leaves(err);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.phase() == Some(Phase::Post)));
        assert!(errors[0].to_string().contains("\"e2e-a\""));
        assert!(errors[1].to_string().contains("\"e2e-b\""));
    }

    #[tokio::test]
    async fn test_errors_ordered_by_phase() {
        let pods = FakePodClient::new()
            .with_outcome("e2e-test", PodOutcome::Fail("t".to_string()))
            .with_outcome("e2e-teardown", PodOutcome::Fail("p".to_string()));
        let mut h = harness(definition(&[], &["test"], &["teardown"]), pods);

        let errors = leaves(h.step.run(ctx()).await.unwrap_err());
        let phases: Vec<_> = errors.iter().map(MultiStageError::phase).collect();
        assert_eq!(phases, vec![Some(Phase::Test), Some(Phase::Post)]);
    }

    #[tokio::test]
    async fn test_results_secret_recreated() {
        let mut h = harness_with(
            MultiStageTestConfiguration::new("e2e"),
            fast_config(),
            Arc::new(DeferredParameters::new()),
            FakePodClient::new(),
            FakeSecretClient::new().with_secret("e2e"),
        );

        h.step.run(ctx()).await.unwrap();
        h.step.run(ctx()).await.unwrap();

        assert_eq!(
            h.secrets.ops(),
            vec!["delete e2e", "create e2e", "delete e2e", "create e2e"]
        );
        let labels = h.secrets.secret("e2e").unwrap().metadata.labels.unwrap();
        assert_eq!(labels["ci.openshift.io/multi-stage-test"], "e2e");
    }

    #[tokio::test]
    async fn test_results_secret_failure_runs_nothing() {
        let mut h = harness_with(
            definition(&["setup"], &[], &[]),
            fast_config(),
            Arc::new(DeferredParameters::new()),
            FakePodClient::new(),
            FakeSecretClient::new().with_create_failure(),
        );

        let err = h.step.run(ctx()).await.unwrap_err();
        assert!(matches!(err, MultiStageError::ResultsSecret { ref name, .. } if name == "e2e"));
        assert!(h.pods.created().is_empty());
    }

    #[tokio::test]
    async fn test_missing_profile_secret() {
        let mut test = definition(&["setup"], &["test"], &["teardown"]);
        test.cluster_profile = Some(ClusterProfile::Aws);
        let mut params = MockParameters::new();
        params.expect_get().never();
        let mut h = harness_with(test, fast_config(), Arc::new(params), FakePodClient::new(), FakeSecretClient::new());

        let err = h.step.run(ctx()).await.unwrap_err();

        assert!(err.to_string().contains("could not find secret \"e2e-cluster-profile\""));
        assert!(matches!(
            err,
            MultiStageError::Configuration(ConfigurationError::MissingProfileSecret { .. })
        ));
        assert!(h.pods.created().is_empty());
        assert_eq!(h.secrets.ops(), vec!["get e2e-cluster-profile"]);
    }

    #[tokio::test]
    async fn test_unresolved_release_parameter() {
        let mut test = definition(&["setup"], &[], &[]);
        test.cluster_profile = Some(ClusterProfile::Aws);
        let mut params = MockParameters::new();
        params
            .expect_get()
            .returning(|name| Err(ParameterError::Unknown(name.to_string())));
        let mut h = harness_with(
            test,
            fast_config(),
            Arc::new(params),
            FakePodClient::new(),
            FakeSecretClient::new().with_secret("e2e-cluster-profile"),
        );

        let err = h.step.run(ctx()).await.unwrap_err();
        assert!(matches!(
            err,
            MultiStageError::Configuration(ConfigurationError::UnresolvedParameter { ref name, .. })
                if name == "RELEASE_IMAGE_INITIAL"
        ));
        assert!(h.pods.created().is_empty());
    }

    #[tokio::test]
    async fn test_profile_wired_into_pods() {
        let mut test = definition(&["install"], &[], &[]);
        test.cluster_profile = Some(ClusterProfile::GcpHa);
        let mut params = MockParameters::new();
        params
            .expect_get()
            .times(2)
            .returning(|name| Ok(format!("registry.ci/release:{}", name.to_lowercase())));
        let mut h = harness_with(
            test,
            fast_config(),
            Arc::new(params),
            FakePodClient::new(),
            FakeSecretClient::new().with_secret("e2e-cluster-profile"),
        );

        h.step.run(ctx()).await.unwrap();
        let pod = h.pods.pod("e2e-install").unwrap();

        let env: Vec<_> = pod.spec.unwrap().containers[0]
            .env
            .clone()
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.value.unwrap_or_default()))
            .collect();
        assert!(env.contains(&("CLUSTER_TYPE".to_string(), "gcp".to_string())));
        assert!(env.contains(&(
            "RELEASE_IMAGE_LATEST".to_string(),
            "registry.ci/release:release_image_latest".to_string()
        )));
    }

    #[tokio::test]
    async fn test_cancellation_cleans_up() {
        let pods = FakePodClient::new().with_outcome("e2e-test", PodOutcome::Hang);
        let mut h = harness(definition(&["setup"], &["test", "never"], &["teardown"]), pods);
        let token = ctx();

        let canceller = {
            let token = token.clone();
            let pods = h.pods.clone();
            tokio::spawn(async move {
                pods.wait_for_pod("e2e-test").await;
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel("job aborted");
            })
        };

        let err = h.step.run(token).await.unwrap_err();
        canceller.await.unwrap();

        // Test pods were deleted by label, and nothing ran after the cancellation.
        assert!(h
            .pods
            .collections_deleted()
            .contains(&"ci.openshift.io/multi-stage-test=e2e".to_string()));
        assert_eq!(h.pods.created(), vec!["e2e-setup", "e2e-test"]);

        let errors = leaves(err);
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e.root(), MultiStageError::Execution(x) if x.is_cancelled())));

        // One record per started container: setup passed, test was cut short.
        let subtests = h.step.subtests();
        assert_eq!(subtests.len(), 2);
        assert!(!subtests[0].is_failure());
        assert!(subtests[1].failure.as_deref().unwrap().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_bad_resources_create_no_pod() {
        let mut test = definition(&[], &[], &[]);
        test.test = vec![
            step("ok", "true"),
            LiteralTestStep::new("bad", "src", "true").with_resources(ResourceRequest::preset("enormous")),
        ];
        test.post = vec![step("teardown", "true")];
        let mut h = harness(test, FakePodClient::new());

        let err = h.step.run(ctx()).await.unwrap_err();

        assert_eq!(h.pods.created(), vec!["e2e-teardown"]);
        let errors = leaves(err);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].root(), MultiStageError::Synthesis(e) if e.pod == "e2e-bad"));
    }

    #[tokio::test]
    async fn test_dry_run_records_objects() {
        let (collecting, logger) = dry_logger();
        let mut h = harness(definition(&["setup"], &["test"], &["teardown"]), FakePodClient::new());
        h.step = h.step.dry_run(logger);

        h.step.run(ctx()).await.unwrap();

        assert!(h.pods.created().is_empty());
        assert!(h.secrets.ops().is_empty());
        let kinds: Vec<_> = collecting.objects().into_iter().map(|o| (o.kind, o.name)).collect();
        assert_eq!(
            kinds,
            vec![
                ("Secret".to_string(), "e2e".to_string()),
                ("Pod".to_string(), "e2e-setup".to_string()),
                ("Pod".to_string(), "e2e-test".to_string()),
                ("Pod".to_string(), "e2e-teardown".to_string()),
            ]
        );
        assert!(collecting.to_json().unwrap().contains("FallbackToLogsOnError"));
    }
}
