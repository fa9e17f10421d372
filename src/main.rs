use imtt_client::api::models::ConversationKey;
use imtt_client::app::AppConfig;
use imtt_client::auth::Authenticator;
use imtt_client::chat::next_refresh;
use imtt_client::storage::SessionStorage;
use imtt_client::{ApiClient, ChatError, ChatSession, Message, Session};
use log::error;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

type Input = Lines<BufReader<Stdin>>;

const HELP: &str = "\
/contact <id>           open a 1:1 conversation
/group <id>             open a group conversation
/groups                 list your groups
/members <group id>     list members of a group
/create <name> [desc]   create a group
/join <group id>        join a group
/logout                 forget this session and quit
/quit                   quit
anything else           send to the open conversation";

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ChatError> {
    let config = AppConfig::load();
    let auth = Authenticator::new(ApiClient::new(&config.api_base()), SessionStorage::open_default()?);
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let session = match auth.restore().await? {
        Some(session) => session,
        None => match sign_in(&auth, &mut input).await? {
            Some(session) => session,
            None => return Ok(()),
        },
    };

    let api = auth.client_for(&session);
    let chat = Arc::new(ChatSession::new(session, Arc::new(api.clone()), config.session_options()?));
    chat.start();
    println!("signed in as {}. /help for commands.", chat.user().username);

    let printer = {
        let chat = chat.clone();
        let mut refresh = chat.subscribe_refresh();
        tokio::spawn(async move {
            while let Some(key) = next_refresh(&mut refresh).await {
                if let Some(last) = chat.timeline(key).last() {
                    print_message(last, chat.user().id);
                }
            }
        })
    };

    while let Ok(Some(line)) = input.next_line().await {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let outcome = match command {
            "" => Ok(()),
            "/help" => {
                println!("{}", HELP);
                Ok(())
            }
            "/quit" => break,
            "/logout" => {
                chat.shutdown();
                auth.logout()?;
                break;
            }
            "/contact" | "/group" => match rest.trim().parse::<i64>() {
                Ok(id) => {
                    let key = if command == "/group" { ConversationKey::Group(id) } else { ConversationKey::Contact(id) };
                    chat.open(key).await.map(|messages| {
                        println!("-- {} ({} messages)", key, messages.len());
                        for message in &messages {
                            print_message(message, chat.user().id);
                        }
                    })
                }
                Err(_) => {
                    println!("usage: {} <id>", command);
                    Ok(())
                }
            },
            "/groups" => api.groups().await.map_err(ChatError::from).map(|groups| {
                for group in groups {
                    println!("{:>6}  {}", group.id, group.name);
                }
            }),
            "/members" => match rest.trim().parse::<i64>() {
                Ok(id) => api.group_members(id).await.map_err(ChatError::from).map(|members| {
                    for member in members {
                        println!("{:>6}  {}", member.user_id, member.role);
                    }
                }),
                Err(_) => {
                    println!("usage: /members <group id>");
                    Ok(())
                }
            },
            "/create" => {
                let (name, description) = rest.trim().split_once(' ').map_or((rest.trim(), None), |(n, d)| (n, Some(d)));
                if name.is_empty() {
                    println!("usage: /create <name> [description]");
                    Ok(())
                } else {
                    api.create_group(name, description)
                        .await
                        .map_err(ChatError::from)
                        .map(|group| println!("created group {} ({})", group.name, group.id))
                }
            }
            "/join" => match rest.trim().parse::<i64>() {
                Ok(id) => api.join_group(id).await.map_err(ChatError::from).map(|_| println!("joined group {}", id)),
                Err(_) => {
                    println!("usage: /join <group id>");
                    Ok(())
                }
            },
            _ if command.starts_with('/') => {
                println!("unknown command, /help for a list");
                Ok(())
            }
            _ => chat.send(line).await.map(|sent| {
                if let Some(message) = sent {
                    print_message(&message, chat.user().id);
                }
            }),
        };
        if let Err(e) = outcome {
            println!("error: {}", e);
        }
    }

    printer.abort();
    chat.transport().disconnect();
    Ok(())
}

/// Prompt for `login <email> <password>` or `register <username> <email> <password>`.
async fn sign_in(auth: &Authenticator, input: &mut Input) -> Result<Option<Session>, ChatError> {
    println!("login <email> <password>  |  register <username> <email> <password>");
    while let Ok(Some(line)) = input.next_line().await {
        let words: Vec<&str> = line.split_whitespace().collect();
        let attempt = match words.as_slice() {
            ["login", email, password] => auth.login(email, password).await,
            ["register", username, email, password] => auth.register(username, email, password).await,
            _ => {
                println!("login <email> <password>  |  register <username> <email> <password>");
                continue;
            }
        };
        match attempt {
            Ok(session) => return Ok(Some(session)),
            Err(e) => println!("error: {}", e),
        }
    }
    Ok(None)
}

fn print_message(message: &Message, me: i64) {
    let who = if message.sender_id == me { "me".to_string() } else { format!("#{}", message.sender_id) };
    println!("[{}] {}: {}", message.created_at.format("%H:%M"), who, message.content);
}
