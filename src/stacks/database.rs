use crate::config::AppConfig;
use crate::graph::{self, HandleKind, Handles, Unit, UnitOutput};
use crate::handles::{NetworkHandle, SecurityGroupHandle};
use crate::resources::ec2::{
    InstanceClass, InstanceSize, InstanceType, Peer, Port, SecurityGroup, SubnetType,
};
use crate::resources::rds::{
    database_instance_class, secret_field, DatabaseEngine, DbInstance, DbSubnetGroup, Secret,
    SecretTargetAttachment,
};
use crate::stack::Stack;
use crate::template::{RemovalPolicy, Tag, Token};

pub const STACK_NAME: &str = "RDSStack";

const SECURITY_GROUP_ID: &str = "RDSSecurityGroup";
const SUBNET_GROUP_ID: &str = "DatabaseSubnetGroup";
const SECRET_ID: &str = "DatabaseSecret";
const DATABASE_ID: &str = "Database";

const ENGINE: DatabaseEngine = DatabaseEngine::Mysql { major: 8, minor: 0 };
const ALLOCATED_STORAGE_GIB: u32 = 20;
const MAX_ALLOCATED_STORAGE_GIB: u32 = 30;
const DATABASE_NAME: &str = "MyDatabase";
const MASTER_USERNAME: &str = "admin";
/// Zone indexes the database may be placed in.
const DATABASE_ZONES: [usize; 2] = [0, 1];

pub struct DatabaseStack {
    pub stack: Stack,
    pub security_group: SecurityGroupHandle,
    pub instance: DbInstance,
    pub removal_policy: RemovalPolicy,
}

pub fn build(
    config: &AppConfig,
    network: &NetworkHandle,
    compute_group: &SecurityGroupHandle,
) -> Result<DatabaseStack, graph::Error> {
    let mut stack = Stack::new(STACK_NAME, format!("Database for {}", config.app_name));
    let vpc = stack.import(&network.vpc_id);
    let source = stack.import(&compute_group.group_id);

    let mut group = SecurityGroup::new("Security Group for RDS Instance", vpc, false);
    group.add_ingress_rule(
        Peer::SecurityGroupId(source),
        Port::tcp(ENGINE.default_port()),
        "Allow MySQL access from the EC2 security group",
    );
    group.tag(Tag::name("RDS-Security-Group"));
    stack.add(SECURITY_GROUP_ID, &group)?;

    let mut subnet_ids = vec![];
    for zone in DATABASE_ZONES {
        let subnet = network
            .subnet_in(SubnetType::PrivateIsolated, zone)
            .ok_or(graph::Error::MissingSubnet {
                subnet_type: SubnetType::PrivateIsolated,
                zone,
            })?;
        subnet_ids.push(stack.import(&subnet.subnet_id));
    }
    stack.add(
        SUBNET_GROUP_ID,
        &DbSubnetGroup {
            description: format!("Isolated subnets for {}", DATABASE_ID),
            subnet_ids,
        },
    )?;

    stack
        .add(
            SECRET_ID,
            &Secret::for_username(MASTER_USERNAME, "Master credentials for the RDS instance"),
        )?
        .apply_removal_policy(RemovalPolicy::Destroy);

    let removal_policy = RemovalPolicy::Destroy;
    let instance = DbInstance {
        engine: ENGINE.name().to_string(),
        engine_version: ENGINE.version(),
        instance_class: database_instance_class(InstanceType::of(
            InstanceClass::T3,
            InstanceSize::Micro,
        )),
        database_name: String::from(DATABASE_NAME),
        subnet_group_name: Token::reference(SUBNET_GROUP_ID),
        vpc_security_groups: vec![Token::get_att(SECURITY_GROUP_ID, "GroupId")],
        master_username: secret_field(SECRET_ID, "username"),
        master_user_password: secret_field(SECRET_ID, "password"),
        allocated_storage: ALLOCATED_STORAGE_GIB.to_string(),
        max_allocated_storage: MAX_ALLOCATED_STORAGE_GIB,
        storage_type: String::from("gp2"),
        multi_az: true,
        publicly_accessible: false,
        deletion_protection: false,
        copy_tags_to_snapshot: true,
        tags: vec![Tag::name("My-RDS-Instance")],
    };
    stack
        .add(DATABASE_ID, &instance)?
        .apply_removal_policy(removal_policy);

    stack.add(
        "DatabaseSecretAttachment",
        &SecretTargetAttachment {
            secret_id: Token::reference(SECRET_ID),
            target_id: Token::reference(DATABASE_ID),
            target_type: String::from("AWS::RDS::DBInstance"),
        },
    )?;

    let group_id = stack.export(
        "SecurityGroupId",
        Token::get_att(SECURITY_GROUP_ID, "GroupId"),
        "Database security group id",
    )?;
    stack.output(
        "DatabaseEndpoint",
        Token::get_att(DATABASE_ID, "Endpoint.Address"),
        "Database endpoint address",
    )?;
    stack.output(
        "DatabaseSecretArn",
        Token::reference(SECRET_ID),
        "Secret holding the master credentials",
    )?;

    tracing::info!(
        stack = STACK_NAME,
        engine = ENGINE.name(),
        version = %ENGINE.version(),
        "database declared"
    );

    return Ok(DatabaseStack {
        stack,
        security_group: SecurityGroupHandle {
            group_id,
            ingress: group.security_group_ingress,
            allow_all_outbound: group.allow_all_outbound,
        },
        instance,
        removal_policy,
    });
}

pub struct DatabaseUnit;

impl Unit for DatabaseUnit {
    fn name(&self) -> &str {
        STACK_NAME
    }

    fn requires(&self) -> Vec<HandleKind> {
        vec![HandleKind::Network, HandleKind::ComputeSecurityGroup]
    }

    fn produces(&self) -> Option<HandleKind> {
        None
    }

    fn build(&self, config: &AppConfig, handles: &Handles) -> Result<UnitOutput, graph::Error> {
        let DatabaseStack { stack, .. } =
            build(config, handles.network()?, handles.compute_security_group()?)?;

        Ok(UnitOutput {
            stack,
            handle: None,
        })
    }
}
