//! The fixed set of manifests emitted for every CockroachDB cluster, and the renderer that fills
//! in a [`ResolvedConfig`].
//!
//! The template is plain text with `{{ key }}` placeholders. Only the keys listed in
//! [`Placeholder`] are understood, everything else in the template is copied verbatim. Rendering
//! is a single pass over the template, substituted values are never scanned again, so a cluster
//! name that happens to contain `{{ replicas }}` is emitted as-is.
use std::str::FromStr;

use snafu::{OptionExt, ResultExt, Snafu};
use strum::EnumString;

use crate::config::ResolvedConfig;

const PLACEHOLDER_OPEN: &str = "{{";
const PLACEHOLDER_CLOSE: &str = "}}";

type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors which indicate that a template is malformed.
///
/// [`MANIFEST_TEMPLATE`] never produces any of these, they only surface when [`render`] is used
/// with a different template.
#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("placeholder opened at byte {offset} is never closed"))]
    UnterminatedPlaceholder { offset: usize },

    #[snafu(display("unknown template placeholder {key:?}"))]
    UnknownPlaceholder {
        source: strum::ParseError,
        key: String,
    },
}

/// The values of a [`ResolvedConfig`] which can be referenced from a template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Placeholder {
    /// The cluster name, taken verbatim from `metadata.name`.
    Name,

    /// The resolved replica count.
    Replicas,

    /// The `app` label shared by every generated object, see [`ResolvedConfig::app_label`].
    AppLabel,

    /// The client facing Service name, see [`ResolvedConfig::public_service_name`].
    PublicServiceName,
}

impl Placeholder {
    fn push_value(self, rendered: &mut String, config: &ResolvedConfig) {
        match self {
            Self::Name => rendered.push_str(config.name()),
            Self::Replicas => rendered.push_str(&config.replicas().to_string()),
            Self::AppLabel => rendered.push_str(&config.app_label()),
            Self::PublicServiceName => rendered.push_str(&config.public_service_name()),
        }
    }
}

/// Renders [`MANIFEST_TEMPLATE`] for the given cluster.
pub fn render_manifests(config: &ResolvedConfig) -> Result<String> {
    render(MANIFEST_TEMPLATE, config)
}

/// Substitutes every `{{ key }}` placeholder in `template` with the matching value of `config`.
///
/// Whitespace between the braces and the key is ignored.
pub fn render(template: &str, config: &ResolvedConfig) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
        let offset = template.len() - rest.len() + start;
        rendered.push_str(&rest[..start]);

        let inner = &rest[start + PLACEHOLDER_OPEN.len()..];
        let end = inner
            .find(PLACEHOLDER_CLOSE)
            .context(UnterminatedPlaceholderSnafu { offset })?;

        let key = inner[..end].trim();
        let placeholder =
            Placeholder::from_str(key).context(UnknownPlaceholderSnafu { key })?;
        placeholder.push_value(&mut rendered, config);

        rest = &inner[end + PLACEHOLDER_CLOSE.len()..];
    }

    rendered.push_str(rest);
    Ok(rendered)
}

/// Public and headless Services, a PodDisruptionBudget and the StatefulSet of a CockroachDB
/// cluster.
///
/// The StatefulSet disables the kpt duck commands so that users don't override the generated
/// image and replica values.
pub const MANIFEST_TEMPLATE: &str = r#"
apiVersion: v1
kind: Service
metadata:
  # This service is meant to be used by clients of the database. It exposes a ClusterIP that will
  # automatically load balance connections to the different database pods.
  name: {{ public_service_name }}
  labels:
    app: {{ app_label }}
  annotations:
    kpt.dev/kio/path: null
    kpt.dev/kio/index: null
spec:
  ports:
  # The main port, served by gRPC, serves Postgres-flavor SQL, internode
  # traffic and the cli.
  - port: 26257
    targetPort: 26257
    name: grpc
  # The secondary port serves the UI as well as health and debug endpoints.
  - port: 8080
    targetPort: 8080
    name: http
  selector:
    app: {{ app_label }}
---
apiVersion: v1
kind: Service
metadata:
  # This service only exists to create DNS entries for each pod in the stateful
  # set such that they can resolve each other's IP addresses. It does not
  # create a load-balanced ClusterIP and should not be used directly by clients
  # in most circumstances.
  name: {{ name }}
  labels:
    app: {{ app_label }}
  annotations:
    # This is needed to make the peer-finder work properly and to help avoid
    # edge cases where instance 0 comes up after losing its data and needs to
    # decide whether it should create a new cluster or try to join an existing
    # one. If it creates a new cluster when it should have joined an existing
    # one, we'd end up with two separate clusters listening at the same service
    # endpoint, which would be very bad.
    service.alpha.kubernetes.io/tolerate-unready-endpoints: "true"
    # Enable automatic monitoring of all instances when Prometheus is running in the cluster.
    prometheus.io/scrape: "true"
    prometheus.io/path: "_status/vars"
    prometheus.io/port: "8080"
    kpt.dev/kio/path: null
    kpt.dev/kio/index: null
spec:
  ports:
  - port: 26257
    targetPort: 26257
    name: grpc
  - port: 8080
    targetPort: 8080
    name: http
  clusterIP: None
  selector:
    app: {{ app_label }}
---
apiVersion: policy/v1beta1
kind: PodDisruptionBudget
metadata:
  name: cockroachdb-budget
  labels:
    app: {{ app_label }}
  annotations:
    kpt.dev/kio/path: null
    kpt.dev/kio/index: null
spec:
  selector:
    matchLabels:
      app: {{ app_label }}
  minAvailable: 67%
---
apiVersion: apps/v1  #  for k8s versions before 1.9.0 use apps/v1beta2  and before 1.8.0 use extensions/v1beta1
kind: StatefulSet
metadata:
  name: {{ name }}
  labels:
    app: {{ app_label }}
  annotations:
    kpt.dev/kio/path: null
    kpt.dev/kio/index: null
    kpt.dev/duck/set-image: disabled
    kpt.dev/duck/get-image: disabled
    kpt.dev/duck/set-replicas: disabled
    kpt.dev/duck/get-replicas: disabled
spec:
  serviceName: {{ name }}
  replicas: {{ replicas }}
  selector:
    matchLabels:
      app: {{ app_label }}
  template:
    metadata:
      labels:
        app: {{ app_label }}
    spec:
      # Init containers are run only once in the lifetime of a pod, before
      # it's started up for the first time. It has to exit successfully
      # before the pod's main containers are allowed to start.
      # This particular init container does a DNS lookup for other pods in
      # the set to help determine whether or not a cluster already exists.
      # If any other pods exist, it creates a file in the cockroach-data
      # directory to pass that information along to the primary container that
      # has to decide what command-line flags to use when starting CockroachDB.
      # This only matters when a pod's persistent volume is empty - if it has
      # data from a previous execution, that data will always be used.
      #
      # If your Kubernetes cluster uses a custom DNS domain, you will have
      # to add an additional arg to this pod: "-domain=<your-custom-domain>"
      initContainers:
      - name: bootstrap
        image: cockroachdb/cockroach-k8s-init:0.1
        imagePullPolicy: IfNotPresent
        args:
        - "-on-start=/on-start.sh"
        - "-service=cockroachdb"
        env:
        - name: POD_NAMESPACE
          valueFrom:
            fieldRef:
              fieldPath: metadata.namespace
        volumeMounts:
        - name: datadir
          mountPath: "/cockroach/cockroach-data"
      affinity:
        podAntiAffinity:
          preferredDuringSchedulingIgnoredDuringExecution:
          - weight: 100
            podAffinityTerm:
              labelSelector:
                matchExpressions:
                - key: app
                  operator: In
                  values:
                  - cockroachdb
              topologyKey: kubernetes.io/hostname
      containers:
      - name: cockroachdb
        image: cockroachdb/cockroach:v1.1.0
        imagePullPolicy: IfNotPresent
        ports:
        - containerPort: 26257
          name: grpc
        - containerPort: 8080
          name: http
        volumeMounts:
        - name: datadir
          mountPath: /cockroach/cockroach-data
        command:
          - "/bin/bash"
          - "-ecx"
          - |
            # The use of qualified `hostname -f` is crucial:
            # Other nodes aren't able to look up the unqualified hostname.
            CRARGS=("start" "--logtostderr" "--insecure" "--host" "$(hostname -f)" "--http-host" "0.0.0.0")
            # We only want to initialize a new cluster (by omitting the join flag)
            # if we're sure that we're the first node (i.e. index 0) and that
            # there aren't any other nodes running as part of the cluster that
            # this is supposed to be a part of (which indicates that a cluster
            # already exists and we should make sure not to create a new one).
            # It's fine to run without --join on a restart if there aren't any
            # other nodes.
            if [ ! "$(hostname)" == "cockroachdb-0" ] || \
               [ -e "/cockroach/cockroach-data/cluster_exists_marker" ]
            then
              # We don't join cockroachdb in order to avoid a node attempting
              # to join itself, which currently doesn't work
              # (https://github.com/cockroachdb/cockroach/issues/9625).
              CRARGS+=("--join" "cockroachdb-public")
            fi
            exec /cockroach/cockroach ${CRARGS[*]}
      # No pre-stop hook is required, a SIGTERM plus some time is all that's
      # needed for graceful shutdown of a node.
      terminationGracePeriodSeconds: 60
      volumes:
      - name: datadir
        persistentVolumeClaim:
          claimName: datadir
  volumeClaimTemplates:
  - metadata:
      name: datadir
    spec:
      accessModes:
        - "ReadWriteOnce"
      resources:
        requests:
          storage: 1Gi
"#;

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde::Deserialize;
    use serde_yaml::Value;

    use super::*;

    fn documents(yaml: &str) -> Vec<Value> {
        serde_yaml::Deserializer::from_str(yaml)
            .map(|document| Value::deserialize(document).expect("rendered YAML must be valid"))
            .collect()
    }

    #[test]
    fn renders_all_manifests() {
        let config = ResolvedConfig::new("mydb", 3);
        let rendered = render_manifests(&config).unwrap();

        assert!(rendered.starts_with("\napiVersion: v1\nkind: Service\n"));
        assert!(!rendered.contains(PLACEHOLDER_OPEN));

        let documents = documents(&rendered);
        let kinds: Vec<_> = documents
            .iter()
            .map(|document| document["kind"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, [
            "Service",
            "Service",
            "PodDisruptionBudget",
            "StatefulSet"
        ]);

        let public_service = &documents[0];
        assert_eq!(public_service["metadata"]["name"].as_str(), Some("mydb-public"));
        assert_eq!(
            public_service["spec"]["selector"]["app"].as_str(),
            Some("mydb-cockroachdb")
        );

        let headless_service = &documents[1];
        assert_eq!(headless_service["metadata"]["name"].as_str(), Some("mydb"));
        assert_eq!(headless_service["spec"]["clusterIP"].as_str(), Some("None"));
        assert_eq!(
            headless_service["metadata"]["annotations"]["prometheus.io/scrape"].as_str(),
            Some("true")
        );

        let budget = &documents[2];
        assert_eq!(budget["metadata"]["name"].as_str(), Some("cockroachdb-budget"));
        assert_eq!(budget["spec"]["minAvailable"].as_str(), Some("67%"));
        assert_eq!(
            budget["spec"]["selector"]["matchLabels"]["app"].as_str(),
            Some("mydb-cockroachdb")
        );

        let stateful_set = &documents[3];
        assert_eq!(stateful_set["metadata"]["name"].as_str(), Some("mydb"));
        assert_eq!(stateful_set["spec"]["serviceName"].as_str(), Some("mydb"));
        assert_eq!(stateful_set["spec"]["replicas"].as_i64(), Some(3));
        assert_eq!(
            stateful_set["metadata"]["annotations"]["kpt.dev/duck/set-replicas"].as_str(),
            Some("disabled")
        );
        assert_eq!(
            stateful_set["spec"]["template"]["metadata"]["labels"]["app"].as_str(),
            Some("mydb-cockroachdb")
        );
        assert_eq!(
            stateful_set["spec"]["volumeClaimTemplates"][0]["metadata"]["name"].as_str(),
            Some("datadir")
        );
    }

    #[rstest]
    #[case(0)]
    #[case(-2)]
    #[case(i64::MAX)]
    fn renders_replicas_unchanged(#[case] replicas: i64) {
        let rendered = render_manifests(&ResolvedConfig::new("db", replicas)).unwrap();
        assert!(rendered.contains(&format!("\n  replicas: {replicas}\n")));
    }

    #[test]
    fn renders_empty_name() {
        let rendered = render_manifests(&ResolvedConfig::new("", 1)).unwrap();
        assert!(rendered.contains("  name: -public\n"));
        assert!(rendered.contains("    app: -cockroachdb\n"));
    }

    #[test]
    fn derived_names_match_resolved_config() {
        let config = ResolvedConfig::new("mydb", 1);
        let rendered = render_manifests(&config).unwrap();

        assert!(rendered.contains(&format!("  name: {}\n", config.public_service_name())));
        assert_eq!(
            rendered.matches(&format!("app: {}\n", config.app_label())).count(),
            9
        );
    }

    #[test]
    fn rendering_is_deterministic() {
        let config = ResolvedConfig::new("mydb", 5);
        assert_eq!(
            render_manifests(&config).unwrap(),
            render_manifests(&config).unwrap()
        );
    }

    #[rstest]
    #[case("{{name}}/{{ replicas }}", "a/7")]
    #[case("no placeholders", "no placeholders")]
    #[case("{{   name   }}-suffix", "a-suffix")]
    #[case("", "")]
    #[case("{{ app_label }} {{ public_service_name }}", "a-cockroachdb a-public")]
    fn substitutes_placeholders(#[case] template: &str, #[case] expected: &str) {
        let rendered = render(template, &ResolvedConfig::new("a", 7)).unwrap();
        assert_eq!(rendered, expected);
    }

    #[test]
    fn substituted_values_are_not_rendered_again() {
        let config = ResolvedConfig::new("{{ replicas }}", 2);
        let rendered = render("name={{ name }}", &config).unwrap();
        assert_eq!(rendered, "name={{ replicas }}");
    }

    #[test]
    fn unknown_placeholder() {
        let err = render("{{ image }}", &ResolvedConfig::new("a", 1)).unwrap_err();
        assert!(matches!(err, Error::UnknownPlaceholder { key, .. } if key == "image"));
    }

    #[test]
    fn unterminated_placeholder() {
        let err = render("name: {{ name", &ResolvedConfig::new("a", 1)).unwrap_err();
        assert_eq!(err, Error::UnterminatedPlaceholder { offset: 6 });
    }
}
